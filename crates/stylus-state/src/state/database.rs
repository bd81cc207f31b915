//! Persistent store boundary.
//!
//! The overlay never touches disk itself. Everything it cannot answer from
//! memory is delegated to a [`StateDatabase`], which the node implements on
//! top of its trie database.
//!
//! This module also lets the EVM read through the overlay: [`StateOverlay`]
//! implements revm's [`DatabaseRef`], serving live objects first and falling
//! back to the store.

use crate::{
    error::{DatabaseError, StateError},
    primitives::WasmTarget,
    state::{object::Account, overlay::StateOverlay},
};
use alloy_primitives::{Address, Bytes, B256, U256};
use revm::{bytecode::Bytecode, state::AccountInfo, DatabaseRef};
use tracing::trace;

/// Source of activated program asm.
pub trait WasmStore {
    /// Reads the asm of `module_hash` for `target`. Empty bytes mean the
    /// program was never activated for that target.
    fn activated_asm(&self, target: &WasmTarget, module_hash: B256)
        -> Result<Bytes, DatabaseError>;
}

/// One leaf of a storage trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieLeaf {
    /// Slot key (the preimage, not the hashed trie path).
    pub key: B256,
    /// RLP-encoded slot value as stored in the trie.
    pub value: Bytes,
}

pub type TrieLeaves<'a> = Box<dyn Iterator<Item = Result<TrieLeaf, DatabaseError>> + 'a>;

/// An opened storage trie of one account.
pub trait StorageTrie {
    /// Iterates all leaves in key order.
    fn leaves(&self) -> Result<TrieLeaves<'_>, DatabaseError>;
}

/// The persistent ledger below the overlay.
pub trait StateDatabase: WasmStore {
    type Trie: StorageTrie;

    fn account(&self, address: Address) -> Result<Option<Account>, DatabaseError>;

    fn storage(&self, address: Address, key: B256) -> Result<B256, DatabaseError>;

    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, DatabaseError>;

    fn block_hash(&self, number: u64) -> Result<B256, DatabaseError>;

    /// Opens the storage trie of `address` at its committed root.
    fn open_storage_trie(&self, address: Address) -> Result<Self::Trie, DatabaseError>;
}

fn to_bytecode(code: Bytes) -> Bytecode {
    if code.is_empty() {
        Bytecode::default()
    } else {
        Bytecode::new_legacy(code)
    }
}

impl<DB: StateDatabase> DatabaseRef for StateOverlay<DB> {
    type Error = StateError;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, StateError> {
        let Some(account) = self.account(address)? else {
            return Ok(None);
        };
        let code = self.state_object(&address).and_then(|obj| obj.code.clone());
        trace!(
            target: "stylus_state",
            %address,
            balance = %account.balance,
            nonce = account.nonce,
            "Read account info"
        );

        Ok(Some(AccountInfo {
            balance: account.balance,
            nonce: account.nonce,
            code_hash: account.code_hash,
            code: code.map(to_bytecode),
        }))
    }

    fn code_by_hash_ref(&self, code_hash: B256) -> Result<Bytecode, StateError> {
        if let Some(code) = self.live_code(code_hash) {
            return Ok(to_bytecode(code));
        }
        Ok(to_bytecode(self.db().code_by_hash(code_hash)?))
    }

    fn storage_ref(&self, address: Address, index: U256) -> Result<U256, StateError> {
        let value = self.state_ref(address, B256::from(index))?;
        Ok(U256::from_be_bytes(value.0))
    }

    fn block_hash_ref(&self, number: u64) -> Result<B256, StateError> {
        Ok(self.db().block_hash(number)?)
    }
}
