use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use std::collections::BTreeMap;
use stylus_state::{
    primitives::{ActivatedWasm, WasmTarget},
    state::{Account, StorageTrie, TrieLeaf, TrieLeaves, WasmStore},
    DatabaseError, StateArgs, StateDatabase, StateOverlay,
};

fn main() {
    // Run registered benchmarks.
    divan::main();
}

struct EmptyDb;

struct EmptyTrie;

impl StorageTrie for EmptyTrie {
    fn leaves(&self) -> Result<TrieLeaves<'_>, DatabaseError> {
        Ok(Box::new(std::iter::empty::<Result<TrieLeaf, DatabaseError>>()))
    }
}

impl WasmStore for EmptyDb {
    fn activated_asm(&self, _: &WasmTarget, _: B256) -> Result<Bytes, DatabaseError> {
        Ok(Bytes::new())
    }
}

impl StateDatabase for EmptyDb {
    type Trie = EmptyTrie;

    fn account(&self, _: Address) -> Result<Option<Account>, DatabaseError> {
        Ok(None)
    }

    fn storage(&self, _: Address, _: B256) -> Result<B256, DatabaseError> {
        Ok(B256::ZERO)
    }

    fn code_by_hash(&self, _: B256) -> Result<Bytes, DatabaseError> {
        Ok(Bytes::new())
    }

    fn block_hash(&self, number: u64) -> Result<B256, DatabaseError> {
        Ok(keccak256(number.to_be_bytes()))
    }

    fn open_storage_trie(&self, _: Address) -> Result<EmptyTrie, DatabaseError> {
        Ok(EmptyTrie)
    }
}

fn asm_map() -> ActivatedWasm {
    BTreeMap::from([
        (WasmTarget::WAVM, Bytes::from_static(b"wavm")),
        (WasmTarget::ARM64, Bytes::from_static(b"arm64")),
    ])
}

// Fill a call frame with storage writes and activations, then roll it back.
#[divan::bench(args = [16, 256, 4096])]
fn revert_call_frame(bencher: divan::Bencher, writes: usize) {
    bencher
        .with_inputs(|| StateOverlay::new(EmptyDb, StateArgs::default()))
        .bench_local_values(|mut overlay| {
            let snapshot = overlay.snapshot();
            for i in 0..writes {
                let address = Address::with_last_byte((i % 8) as u8);
                let key = B256::from(U256::from(i));
                overlay.set_state(address, key, B256::repeat_byte(1)).unwrap();
                if i % 64 == 0 {
                    overlay.activate_wasm(key, asm_map()).unwrap();
                }
            }
            overlay.revert_to_snapshot(snapshot);
            overlay
        });
}

#[divan::bench(args = [32, 1024])]
fn recent_wasms(bencher: divan::Bencher, programs: u64) {
    let mut overlay = StateOverlay::new(EmptyDb, StateArgs::default());
    bencher.bench_local(|| {
        for i in 0..programs {
            overlay.insert_recent_wasm(B256::from(U256::from(i % 48)));
        }
    });
}
