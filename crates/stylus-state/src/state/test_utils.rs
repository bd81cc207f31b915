use crate::{
    error::DatabaseError,
    primitives::WasmTarget,
    state::{
        database::{StateDatabase, StorageTrie, TrieLeaf, TrieLeaves, WasmStore},
        object::Account,
        overlay::StateChangeset,
    },
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use std::collections::{BTreeMap, HashMap, HashSet};

/// In-memory store with fault injection.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockDb {
    accounts: HashMap<Address, Account>,
    storage: HashMap<Address, BTreeMap<B256, B256>>,
    code: HashMap<B256, Bytes>,
    asm: HashMap<(WasmTarget, B256), Bytes>,
    asm_faults: HashSet<WasmTarget>,
    trie_open_faults: HashSet<Address>,
    trie_iter_faults: HashSet<Address>,
    /// Leaves stored verbatim, bypassing value encoding.
    raw_leaves: HashMap<Address, Vec<TrieLeaf>>,
}

impl MockDb {
    pub(crate) fn with_account(mut self, address: Address, balance: U256, nonce: u64) -> Self {
        let account = self.accounts.entry(address).or_default();
        account.balance = balance;
        account.nonce = nonce;
        self
    }

    pub(crate) fn with_code(mut self, address: Address, code: Bytes) -> Self {
        let code_hash = keccak256(&code);
        self.accounts.entry(address).or_default().code_hash = code_hash;
        self.code.insert(code_hash, code);
        self
    }

    pub(crate) fn with_storage(mut self, address: Address, key: B256, value: B256) -> Self {
        self.storage.entry(address).or_default().insert(key, value);
        self
    }

    pub(crate) fn with_raw_leaf(mut self, address: Address, key: B256, value: Bytes) -> Self {
        self.raw_leaves
            .entry(address)
            .or_default()
            .push(TrieLeaf { key, value });
        self
    }

    pub(crate) fn with_asm(mut self, target: WasmTarget, module_hash: B256, asm: &'static [u8]) -> Self {
        self.asm
            .insert((target, module_hash), Bytes::from_static(asm));
        self
    }

    pub(crate) fn with_asm_fault(mut self, target: WasmTarget) -> Self {
        self.asm_faults.insert(target);
        self
    }

    pub(crate) fn with_trie_open_fault(mut self, address: Address) -> Self {
        self.trie_open_faults.insert(address);
        self
    }

    pub(crate) fn with_trie_iter_fault(mut self, address: Address) -> Self {
        self.trie_iter_faults.insert(address);
        self
    }

    /// Persists a committed changeset the way the node would.
    pub(crate) fn apply(&mut self, changeset: &StateChangeset) {
        for address in &changeset.destructed {
            self.accounts.remove(address);
            self.storage.remove(address);
        }
        for (address, update) in &changeset.accounts {
            self.accounts.insert(*address, update.account.clone());
            if let Some(code) = &update.code {
                self.code.insert(update.account.code_hash, code.clone());
            }
        }
        for (address, slots) in &changeset.storage {
            let storage = self.storage.entry(*address).or_default();
            for (key, value) in slots {
                if value.is_zero() {
                    storage.remove(key);
                } else {
                    storage.insert(*key, *value);
                }
            }
        }
        for (module_hash, asm_map) in &changeset.activated_wasms {
            for (target, asm) in asm_map {
                self.asm.insert((target.clone(), *module_hash), asm.clone());
            }
        }
    }
}

impl WasmStore for MockDb {
    fn activated_asm(&self, target: &WasmTarget, module_hash: B256) -> Result<Bytes, DatabaseError> {
        if self.asm_faults.contains(target) {
            return Err(DatabaseError::msg(format!("asm table for {target} unavailable")));
        }
        Ok(self
            .asm
            .get(&(target.clone(), module_hash))
            .cloned()
            .unwrap_or_default())
    }
}

impl StateDatabase for MockDb {
    type Trie = MockTrie;

    fn account(&self, address: Address) -> Result<Option<Account>, DatabaseError> {
        Ok(self.accounts.get(&address).cloned())
    }

    fn storage(&self, address: Address, key: B256) -> Result<B256, DatabaseError> {
        Ok(self
            .storage
            .get(&address)
            .and_then(|slots| slots.get(&key))
            .copied()
            .unwrap_or_default())
    }

    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, DatabaseError> {
        Ok(self.code.get(&code_hash).cloned().unwrap_or_default())
    }

    fn block_hash(&self, number: u64) -> Result<B256, DatabaseError> {
        Ok(keccak256(number.to_be_bytes()))
    }

    fn open_storage_trie(&self, address: Address) -> Result<MockTrie, DatabaseError> {
        if self.trie_open_faults.contains(&address) {
            return Err(DatabaseError::msg("missing trie node"));
        }
        let mut leaves: Vec<TrieLeaf> = self
            .storage
            .get(&address)
            .into_iter()
            .flatten()
            .filter(|(_, value)| !value.is_zero())
            .map(|(key, value)| TrieLeaf {
                key: *key,
                value: encode_storage_value(value),
            })
            .collect();
        leaves.extend(self.raw_leaves.get(&address).into_iter().flatten().cloned());
        leaves.sort_by_key(|leaf| leaf.key);
        Ok(MockTrie {
            leaves,
            fault: self.trie_iter_faults.contains(&address),
        })
    }
}

/// RLP string of the value without leading zeros, as tries store slots.
pub(crate) fn encode_storage_value(value: &B256) -> Bytes {
    let trimmed = &value[value.iter().take_while(|byte| **byte == 0).count()..];
    alloy_rlp::encode(trimmed).into()
}

#[derive(Debug)]
pub(crate) struct MockTrie {
    leaves: Vec<TrieLeaf>,
    /// Fail after the last leaf.
    fault: bool,
}

impl StorageTrie for MockTrie {
    fn leaves(&self) -> Result<TrieLeaves<'_>, DatabaseError> {
        let leaves = self.leaves.iter().cloned().map(Ok);
        let fault = self
            .fault
            .then(|| Err(DatabaseError::msg("corrupt trie node")));
        Ok(Box::new(leaves.chain(fault)))
    }
}

pub(crate) fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub(crate) fn slot(byte: u8) -> B256 {
    B256::with_last_byte(byte)
}

pub(crate) fn bundle(targets: &[(WasmTarget, &'static [u8])]) -> crate::primitives::ActivatedWasm {
    targets
        .iter()
        .map(|(target, asm)| (target.clone(), Bytes::from_static(asm)))
        .collect()
}
