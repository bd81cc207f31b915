//! Account storage enumeration.

use crate::{
    error::StateError,
    state::{
        database::{StateDatabase, StorageTrie},
        overlay::StateOverlay,
    },
};
use alloy_primitives::{Address, B256};
use alloy_rlp::Header;
use std::collections::BTreeMap;
use tracing::{instrument, trace};

/// Decodes a storage trie leaf into the slot value.
///
/// Leaves hold the RLP string of the value with leading zeros stripped. Only
/// the first item's content is used, whatever its kind, and content longer
/// than a word keeps its last 32 bytes.
pub fn decode_storage_value(mut leaf: &[u8]) -> Result<B256, alloy_rlp::Error> {
    let header = Header::decode(&mut leaf)?;
    let payload = leaf
        .get(..header.payload_length)
        .ok_or(alloy_rlp::Error::InputTooShort)?;
    let tail = &payload[payload.len().saturating_sub(32)..];
    Ok(B256::left_padding_from(tail))
}

impl<DB: StateDatabase> StateOverlay<DB> {
    /// Visits the storage of `address`, overlay writes first and then the
    /// committed trie for every slot the overlay does not shadow.
    ///
    /// Returning `false` from `visit` stops the walk. Accounts unknown to the
    /// overlay and the store are skipped. The trie is opened before anything
    /// is visited, so a trie fault fails the call even for accounts whose
    /// storage lives entirely in the overlay.
    #[instrument(level = "trace", skip(self, visit))]
    pub fn for_each_storage(
        &self,
        address: Address,
        mut visit: impl FnMut(B256, B256) -> bool,
    ) -> Result<(), StateError> {
        if !self.exists(address)? {
            return Ok(());
        }
        let trie = self.db().open_storage_trie(address)?;

        let mut overlay = BTreeMap::new();
        if let Some(obj) = self.state_object(&address) {
            overlay.extend(obj.pending_storage.iter().map(|(k, v)| (*k, *v)));
            overlay.extend(obj.dirty_storage.iter().map(|(k, v)| (*k, *v)));
        }
        for (key, value) in &overlay {
            if !visit(*key, *value) {
                return Ok(());
            }
        }

        // committed slots of a destructed account are already gone
        if self.is_destructed(&address) {
            return Ok(());
        }
        let mut visited = 0usize;
        for leaf in trie.leaves()? {
            let leaf = leaf?;
            if overlay.contains_key(&leaf.key) || leaf.value.is_empty() {
                continue;
            }
            visited += 1;
            if !visit(leaf.key, decode_storage_value(&leaf.value)?) {
                break;
            }
        }
        trace!(target: "stylus_state", overlay = overlay.len(), visited, "Walked account storage");
        Ok(())
    }
}
