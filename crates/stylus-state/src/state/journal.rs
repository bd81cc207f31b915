//! Journal of revertible overlay mutations.
//!
//! Every mutation of the overlay appends one [`JournalEntry`] carrying what
//! is needed to undo it. A [`Snapshot`] is the journal length at capture time;
//! reverting to it undoes the newer entries in reverse order and drops them.
//!
//! Undo is not commutative. A later entry may depend on state an earlier one
//! created (a storage write on an object created in the same transaction), so
//! entries are always undone strictly last-in, first-out.

use crate::{
    primitives::{CacheWasm, EvictWasm, WasmCacheOp},
    state::{ledger::LedgerState, object::StateObject},
};
use alloy_primitives::{Address, Bytes, B256, I256, U256};
use std::collections::HashMap;
use tracing::trace;

/// Opaque journal position returned by [`Journal::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snapshot(usize);

impl Snapshot {
    /// Journal length at capture time.
    pub fn journal_len(&self) -> usize {
        self.0
    }
}

/// One revertible mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// A fresh object was created where none was live.
    CreateObject { address: Address },
    /// A live object was replaced by a fresh one.
    ResetObject {
        prev: Box<StateObject>,
        prev_destructed: bool,
    },
    /// An empty placeholder was created for a destructed account.
    CreateZombie { address: Address },
    SelfDestruct {
        address: Address,
        prev: bool,
        prev_balance: U256,
    },
    /// A balance change, also booked in the unexpected balance delta.
    BalanceChange { address: Address, prev: U256 },
    /// The caller announced an expected mint or burn.
    ExpectedBalanceDelta { prev: I256 },
    NonceChange { address: Address, prev: u64 },
    CodeChange {
        address: Address,
        prev_code: Option<Bytes>,
        prev_hash: B256,
    },
    StorageChange {
        address: Address,
        key: B256,
        /// Dirty value before the write, `None` if the slot was clean.
        prev: Option<B256>,
    },
    /// The account was accessed; only marks it dirty.
    Touch { address: Address },
    /// A module was added to the in-flight activation layer.
    WasmActivation { module_hash: B256 },
    /// Intent to cache a program once the cycle commits.
    CacheWasm(CacheWasm),
    /// Intent to evict a program once the cycle commits.
    EvictWasm(EvictWasm),
}

impl JournalEntry {
    /// The account this entry dirties, if any.
    pub fn address(&self) -> Option<Address> {
        match self {
            JournalEntry::CreateObject { address }
            | JournalEntry::CreateZombie { address }
            | JournalEntry::SelfDestruct { address, .. }
            | JournalEntry::BalanceChange { address, .. }
            | JournalEntry::NonceChange { address, .. }
            | JournalEntry::CodeChange { address, .. }
            | JournalEntry::StorageChange { address, .. }
            | JournalEntry::Touch { address } => Some(*address),
            JournalEntry::ResetObject { prev, .. } => Some(prev.address),
            JournalEntry::ExpectedBalanceDelta { .. }
            | JournalEntry::WasmActivation { .. }
            | JournalEntry::CacheWasm(_)
            | JournalEntry::EvictWasm(_) => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
    /// Number of live entries per dirtied account.
    dirties: HashMap<Address, usize>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: JournalEntry) {
        if let Some(address) = entry.address() {
            *self.dirties.entry(address).or_default() += 1;
        }
        self.entries.push(entry);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Accounts touched by the live entries.
    pub fn dirtied(&self) -> impl Iterator<Item = &Address> + '_ {
        self.dirties.keys()
    }

    pub fn is_dirty(&self, address: &Address) -> bool {
        self.dirties.contains_key(address)
    }

    /// Cache intents still in the journal, in append order.
    pub fn wasm_cache_ops(&self) -> impl Iterator<Item = WasmCacheOp> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            JournalEntry::CacheWasm(op) => Some(WasmCacheOp::Cache(*op)),
            JournalEntry::EvictWasm(op) => Some(WasmCacheOp::Evict(*op)),
            _ => None,
        })
    }

    /// Undoes every entry appended after `snapshot`, newest first, and
    /// returns how many were undone.
    ///
    /// # Panics
    ///
    /// If `snapshot` is past the end of the journal. That can only be a
    /// snapshot from before a reset or from another journal, and the state
    /// it would restore no longer exists.
    pub(crate) fn revert_to(&mut self, snapshot: Snapshot, state: &mut LedgerState) -> usize {
        assert!(
            snapshot.0 <= self.entries.len(),
            "snapshot {} out of range, journal has {} entries",
            snapshot.0,
            self.entries.len()
        );

        let reverted = self.entries.len() - snapshot.0;
        for entry in self.entries.drain(snapshot.0..).rev() {
            if let Some(address) = entry.address() {
                if let Some(count) = self.dirties.get_mut(&address) {
                    *count -= 1;
                    if *count == 0 {
                        self.dirties.remove(&address);
                    }
                }
            }
            undo(entry, state);
        }

        trace!(target: "stylus_state", snapshot = snapshot.0, reverted, "Reverted journal");
        reverted
    }

    /// Forgets all entries, making the current state the new baseline.
    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.dirties.clear();
    }
}

fn undo(entry: JournalEntry, state: &mut LedgerState) {
    match entry {
        JournalEntry::CreateObject { address } | JournalEntry::CreateZombie { address } => {
            state.objects.remove(&address);
        }
        JournalEntry::ResetObject {
            prev,
            prev_destructed,
        } => {
            if !prev_destructed {
                state.destructed.remove(&prev.address);
            }
            state.objects.insert(prev.address, *prev);
        }
        JournalEntry::SelfDestruct {
            address,
            prev,
            prev_balance,
        } => {
            if let Some(obj) = state.objects.get_mut(&address) {
                obj.self_destructed = prev;
                obj.data.balance = prev_balance;
                state.unexpected_balance_delta = state
                    .unexpected_balance_delta
                    .wrapping_add(I256::from_raw(prev_balance));
            }
        }
        JournalEntry::BalanceChange { address, prev } => {
            if let Some(obj) = state.objects.get_mut(&address) {
                let current = obj.data.balance;
                obj.data.balance = prev;
                state.record_unexpected(current, prev);
            }
        }
        JournalEntry::ExpectedBalanceDelta { prev } => {
            state.unexpected_balance_delta = prev;
        }
        JournalEntry::NonceChange { address, prev } => {
            if let Some(obj) = state.objects.get_mut(&address) {
                obj.data.nonce = prev;
            }
        }
        JournalEntry::CodeChange {
            address,
            prev_code,
            prev_hash,
        } => {
            if let Some(obj) = state.objects.get_mut(&address) {
                obj.code = prev_code;
                obj.data.code_hash = prev_hash;
            }
        }
        JournalEntry::StorageChange { address, key, prev } => {
            if let Some(obj) = state.objects.get_mut(&address) {
                obj.restore_state(key, prev);
            }
        }
        JournalEntry::WasmActivation { module_hash } => {
            state.activated_wasms.remove(&module_hash);
        }
        // markers only, the durable cache acts on them at commit
        JournalEntry::Touch { .. } | JournalEntry::CacheWasm(_) | JournalEntry::EvictWasm(_) => {}
    }
}
