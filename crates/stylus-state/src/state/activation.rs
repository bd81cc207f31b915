//! Newly activated Stylus programs.
//!
//! Activations land here first and stay until the cycle is committed. All
//! activations within one cycle must carry the same target set; other parts
//! of the node rely on it, so it is checked on every insert.

use crate::{
    error::{ActivationError, DatabaseError},
    primitives::{wasm::targets_of, ActivatedWasm, WasmTarget},
    state::database::WasmStore,
};
use alloy_primitives::{Bytes, B256};
use std::collections::HashMap;
use tracing::{error, trace};

/// Result of a bulk asm lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsmMapLookup {
    /// Asm found, by target.
    pub asm_map: ActivatedWasm,
    /// Requested targets the store has no asm for.
    pub missing_targets: Vec<WasmTarget>,
}

impl AsmMapLookup {
    pub fn is_complete(&self) -> bool {
        self.missing_targets.is_empty()
    }
}

/// The in-flight activation layer.
#[derive(Debug, Clone, Default)]
pub struct ActivatedWasms {
    wasms: HashMap<B256, ActivatedWasm>,
}

impl ActivatedWasms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `asm_map` under `module_hash` unless the module is already present.
    ///
    /// Returns `Ok(true)` if the entry was inserted and must be journaled,
    /// `Ok(false)` if the module was already activated in this cycle.
    pub fn activate(
        &mut self,
        module_hash: B256,
        asm_map: ActivatedWasm,
    ) -> Result<bool, ActivationError> {
        if self.wasms.contains_key(&module_hash) {
            return Ok(false);
        }

        // existing entries are mutually consistent, so checking one is enough
        if let Some(previous) = self.wasms.values().next() {
            if !previous.keys().eq(asm_map.keys()) {
                let previous_targets = targets_of(previous);
                let new_targets = targets_of(&asm_map);
                error!(
                    target: "stylus_state",
                    %module_hash,
                    ?previous_targets,
                    ?new_targets,
                    "Inconsistent stylus compile targets used with state overlay, previously activated module with different target list"
                );
                return Err(ActivationError::InconsistentTargets {
                    module_hash,
                    previous: previous_targets,
                    new: new_targets,
                });
            }
        }

        trace!(target: "stylus_state", %module_hash, targets = asm_map.len(), "Activated wasm");
        self.wasms.insert(module_hash, asm_map);
        Ok(true)
    }

    /// Drops an activation. Only the journal calls this, on revert.
    pub(crate) fn remove(&mut self, module_hash: &B256) -> Option<ActivatedWasm> {
        self.wasms.remove(module_hash)
    }

    /// Empties the layer at the end of a cycle.
    pub(crate) fn take(&mut self) -> HashMap<B256, ActivatedWasm> {
        std::mem::take(&mut self.wasms)
    }

    pub fn get(&self, module_hash: &B256) -> Option<&ActivatedWasm> {
        self.wasms.get(module_hash)
    }

    pub fn contains(&self, module_hash: &B256) -> bool {
        self.wasms.contains_key(module_hash)
    }

    pub fn module_hashes(&self) -> impl Iterator<Item = &B256> + '_ {
        self.wasms.keys()
    }

    pub fn len(&self) -> usize {
        self.wasms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wasms.is_empty()
    }

    /// Looks up the asm of one target.
    ///
    /// A module activated in this cycle without `target` yields `None`; the
    /// store is only consulted for modules that are not in flight.
    pub fn activated_asm<DB: WasmStore + ?Sized>(
        &self,
        db: &DB,
        target: &WasmTarget,
        module_hash: B256,
    ) -> Result<Option<Bytes>, DatabaseError> {
        if let Some(asm_map) = self.wasms.get(&module_hash) {
            return Ok(asm_map.get(target).cloned());
        }
        let asm = db.activated_asm(target, module_hash)?;
        Ok((!asm.is_empty()).then_some(asm))
    }

    /// Looks up the asm of every target in `targets`.
    ///
    /// Targets absent from the store are reported in
    /// [`AsmMapLookup::missing_targets`]. An in-flight activation lacking a
    /// requested target, or a store fault, fails the whole lookup.
    pub fn activated_asm_map<DB: WasmStore + ?Sized>(
        &self,
        db: &DB,
        targets: &[WasmTarget],
        module_hash: B256,
    ) -> Result<AsmMapLookup, ActivationError> {
        if let Some(asm_map) = self.wasms.get(&module_hash) {
            if let Some(target) = targets.iter().find(|target| !asm_map.contains_key(*target)) {
                return Err(ActivationError::IncompleteActivation {
                    module_hash,
                    target: target.clone(),
                    requested: targets.to_vec(),
                });
            }
            return Ok(AsmMapLookup {
                asm_map: asm_map.clone(),
                missing_targets: Vec::new(),
            });
        }

        let mut lookup = AsmMapLookup::default();
        for target in targets {
            let asm = db.activated_asm(target, module_hash).map_err(|source| {
                ActivationError::Database {
                    module_hash,
                    target: target.clone(),
                    requested: targets.to_vec(),
                    source,
                }
            })?;
            if asm.is_empty() {
                lookup.missing_targets.push(target.clone());
            } else {
                lookup.asm_map.insert(target.clone(), asm);
            }
        }
        Ok(lookup)
    }
}
