use alloy_primitives::{Bytes, B256};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
};

/// A native compilation target for activated Stylus programs.
///
/// Targets are opaque to the state layer. The well-known ones are provided as
/// constants, but any name is accepted.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WasmTarget(Cow<'static, str>);

impl WasmTarget {
    /// Arbitrator WAVM, used for fraud proofs.
    pub const WAVM: Self = Self(Cow::Borrowed("wavm"));
    pub const ARM64: Self = Self(Cow::Borrowed("arm64"));
    pub const AMD64: Self = Self(Cow::Borrowed("amd64"));
    /// Whatever the running node compiles for natively.
    pub const HOST: Self = Self(Cow::Borrowed("host"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for WasmTarget {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for WasmTarget {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

/// Compiled artifacts of one program, keyed by target.
pub type ActivatedWasm = BTreeMap<WasmTarget, Bytes>;

/// Programs touched during a recorded execution, keyed by module hash.
pub type UserWasms = HashMap<B256, ActivatedWasm>;

/// Returns the sorted target set of an activation.
pub fn targets_of(asm_map: &ActivatedWasm) -> Vec<WasmTarget> {
    asm_map.keys().cloned().collect()
}

/// Request to place a program in the node's long-lived native cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheWasm {
    pub module_hash: B256,
    pub version: u16,
    pub tag: u32,
    pub debug: bool,
}

/// Request to drop a program from the node's long-lived native cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictWasm {
    pub module_hash: B256,
    pub version: u16,
    pub tag: u32,
    pub debug: bool,
}

/// A cache intent that survived its transaction, replayed by the durable
/// cache at commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WasmCacheOp {
    Cache(CacheWasm),
    Evict(EvictWasm),
}

impl WasmCacheOp {
    pub fn module_hash(&self) -> B256 {
        match self {
            WasmCacheOp::Cache(op) => op.module_hash,
            WasmCacheOp::Evict(op) => op.module_hash,
        }
    }
}
