use crate::primitives::WasmTarget;
use alloy_primitives::B256;
use revm::database_interface::DBErrorMarker;

type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// A fault reported by the persistent store.
///
/// "Not found" is never an error at this boundary; lookups signal it with an
/// empty result instead.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct DatabaseError(BoxError);

impl DatabaseError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(err.into())
    }

    pub fn msg(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        Self(msg.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    /// An activation in this cycle used a different target set than earlier ones.
    #[error(
        "inconsistent stylus compile targets for module {module_hash}: previous {previous:?}, new {new:?}"
    )]
    InconsistentTargets {
        module_hash: B256,
        previous: Vec<WasmTarget>,
        new: Vec<WasmTarget>,
    },
    /// Newly activated asm exists for the module but lacks a requested target.
    #[error(
        "newly activated wasms for module {module_hash} exist, but they don't contain asm for target {target}"
    )]
    IncompleteActivation {
        module_hash: B256,
        target: WasmTarget,
        requested: Vec<WasmTarget>,
    },
    /// The store failed while looking up a requested target.
    #[error("failed to read asm for module {module_hash}, target {target}: {source}")]
    Database {
        module_hash: B256,
        target: WasmTarget,
        requested: Vec<WasmTarget>,
        #[source]
        source: DatabaseError,
    },
    /// A recorded program is not available for every requested target.
    #[error("can't find activated wasm for module {module_hash}, missing targets: {missing:?}")]
    MissingTargets {
        module_hash: B256,
        missing: Vec<WasmTarget>,
    },
}

impl ActivationError {
    /// Targets that could not be served.
    ///
    /// Bulk lookup failures never partially succeed, so for those this is the
    /// full requested list.
    pub fn missing_targets(&self) -> &[WasmTarget] {
        match self {
            ActivationError::InconsistentTargets { .. } => &[],
            ActivationError::IncompleteActivation { requested, .. }
            | ActivationError::Database { requested, .. } => requested,
            ActivationError::MissingTargets { missing, .. } => missing,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state database error: {0}")]
    Database(#[from] DatabaseError),
    /// A storage trie leaf could not be decoded.
    #[error("malformed storage value: {0}")]
    StorageValue(#[from] alloy_rlp::Error),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    /// The current transaction was flagged by the transaction filter.
    #[error("internal error")]
    TxFiltered,
}

impl DBErrorMarker for StateError {}
