use crate::state::{activation::ActivatedWasms, object::StateObject};
use alloy_primitives::{Address, I256, U256};
use std::collections::{HashMap, HashSet};

/// Overlay state that journal entries know how to restore.
#[derive(Debug)]
pub struct LedgerState {
    pub(crate) objects: HashMap<Address, StateObject>,
    /// Accounts destructed since the last commit.
    pub(crate) destructed: HashSet<Address>,
    pub(crate) activated_wasms: ActivatedWasms,
    /// Total balance change across all accounts not explained by transfers.
    pub(crate) unexpected_balance_delta: I256,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            destructed: HashSet::new(),
            activated_wasms: ActivatedWasms::default(),
            unexpected_balance_delta: I256::ZERO,
        }
    }
}

impl LedgerState {
    /// Books a balance change from `prev` to `new` as unexpected.
    pub(crate) fn record_unexpected(&mut self, prev: U256, new: U256) {
        self.unexpected_balance_delta = self
            .unexpected_balance_delta
            .wrapping_add(I256::from_raw(new))
            .wrapping_sub(I256::from_raw(prev));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_delta_cancels_exactly() {
        let mut state = LedgerState::default();
        state.record_unexpected(U256::from(100), U256::from(30));
        assert_eq!(state.unexpected_balance_delta, I256::try_from(-70i64).unwrap());

        state.record_unexpected(U256::ZERO, U256::MAX);
        state.record_unexpected(U256::MAX, U256::ZERO);
        state.record_unexpected(U256::from(30), U256::from(100));
        assert_eq!(state.unexpected_balance_delta, I256::ZERO);
    }
}
