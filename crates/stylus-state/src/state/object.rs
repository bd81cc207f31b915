//! Live account objects held by the overlay.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use revm::primitives::KECCAK_EMPTY;
use std::collections::HashMap;

/// Account data as stored in the account trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub balance: U256,
    pub nonce: u64,
    pub code_hash: B256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            balance: U256::ZERO,
            nonce: 0,
            code_hash: KECCAK_EMPTY,
        }
    }
}

impl Account {
    /// EIP-161 emptiness.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == KECCAK_EMPTY
    }
}

/// An account being modified in the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateObject {
    pub(crate) address: Address,
    pub(crate) data: Account,
    /// Code set in this cycle. `None` means "whatever the store has".
    pub(crate) code: Option<Bytes>,
    /// Writes from the current transaction.
    pub(crate) dirty_storage: HashMap<B256, B256>,
    /// Writes from finalised transactions not yet committed.
    pub(crate) pending_storage: HashMap<B256, B256>,
    pub(crate) self_destructed: bool,
    /// Placeholder for a destructed account that must keep its trie entry.
    pub(crate) zombie: bool,
}

impl StateObject {
    pub(crate) fn new(address: Address, data: Account) -> Self {
        Self {
            address,
            data,
            code: None,
            dirty_storage: HashMap::new(),
            pending_storage: HashMap::new(),
            self_destructed: false,
            zombie: false,
        }
    }

    pub(crate) fn new_zombie(address: Address) -> Self {
        Self {
            zombie: true,
            ..Self::new(address, Account::default())
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn account(&self) -> &Account {
        &self.data
    }

    pub fn balance(&self) -> U256 {
        self.data.balance
    }

    pub fn nonce(&self) -> u64 {
        self.data.nonce
    }

    pub fn code_hash(&self) -> B256 {
        self.data.code_hash
    }

    pub fn is_self_destructed(&self) -> bool {
        self.self_destructed
    }

    pub fn is_zombie(&self) -> bool {
        self.zombie
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dirty_storage(&self) -> &HashMap<B256, B256> {
        &self.dirty_storage
    }

    /// Storage value known to the overlay, without consulting the store.
    pub(crate) fn cached_state(&self, key: &B256) -> Option<B256> {
        self.dirty_storage
            .get(key)
            .or_else(|| self.pending_storage.get(key))
            .copied()
    }

    /// Writes a dirty slot, returning the previous dirty value.
    pub(crate) fn set_state(&mut self, key: B256, value: B256) -> Option<B256> {
        self.dirty_storage.insert(key, value)
    }

    pub(crate) fn restore_state(&mut self, key: B256, prev: Option<B256>) {
        match prev {
            Some(value) => {
                self.dirty_storage.insert(key, value);
            }
            None => {
                self.dirty_storage.remove(&key);
            }
        }
    }

    pub(crate) fn set_code(&mut self, code: Bytes) {
        self.data.code_hash = if code.is_empty() {
            KECCAK_EMPTY
        } else {
            keccak256(&code)
        };
        self.code = Some(code);
    }

    /// Moves this transaction's writes into the pending set.
    pub(crate) fn finalise(&mut self) {
        self.pending_storage.extend(self.dirty_storage.drain());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_account_is_empty() {
        assert!(Account::default().is_empty());
        let funded = Account {
            balance: U256::from(1),
            ..Default::default()
        };
        assert!(!funded.is_empty());
    }

    #[test]
    fn test_dirty_shadows_pending() {
        let mut obj = StateObject::new(Address::ZERO, Account::default());
        let key = B256::with_last_byte(1);

        obj.set_state(key, B256::with_last_byte(10));
        obj.finalise();
        assert_eq!(obj.cached_state(&key), Some(B256::with_last_byte(10)));

        let prev = obj.set_state(key, B256::with_last_byte(20));
        assert_eq!(prev, None);
        assert_eq!(obj.cached_state(&key), Some(B256::with_last_byte(20)));

        obj.restore_state(key, prev);
        assert_eq!(obj.cached_state(&key), Some(B256::with_last_byte(10)));
    }

    #[test]
    fn test_set_code_updates_hash() {
        let mut obj = StateObject::new(Address::ZERO, Account::default());
        obj.set_code(Bytes::from_static(&[0x60, 0x00]));
        assert_eq!(obj.code_hash(), keccak256([0x60, 0x00]));
        assert!(!obj.is_empty());

        obj.set_code(Bytes::new());
        assert_eq!(obj.code_hash(), KECCAK_EMPTY);
    }
}
