//! Revertible ledger state with Stylus program support.
//!
//! [`StateOverlay`] sits between the executing transaction and the
//! persistent [`StateDatabase`]. Writes go to live objects and are recorded
//! in the [`Journal`], reads fall through to the store.
//!
//! ```text
//! StateOverlay ──reads──> ActivatedWasms ──miss──> StateDatabase
//!      │
//!      └──writes──> Journal (undo records)
//! ```

pub mod activation;
pub mod database;
pub mod journal;
mod ledger;
pub mod object;
pub mod overlay;
pub mod recent;
pub mod storage;

#[cfg(test)]
mod test_utils;

pub use activation::{ActivatedWasms, AsmMapLookup};
pub use database::{StateDatabase, StorageTrie, TrieLeaf, TrieLeaves, WasmStore};
pub use journal::{Journal, JournalEntry, Snapshot};
pub use object::{Account, StateObject};
pub use overlay::{AccountUpdate, StateChangeset, StateOverlay, StylusExtra};
pub use recent::RecentWasms;
pub use storage::decode_storage_value;
