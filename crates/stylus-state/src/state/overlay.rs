//! The ledger overlay.
//!
//! [`StateOverlay`] is the mutable working copy of the ledger for one
//! execution context. Every mutation is journaled so a failed call frame can
//! be rolled back with [`StateOverlay::revert_to_snapshot`], including the
//! Stylus activations made within it.
//!
//! Lifetimes of the pieces it owns:
//!
//! - journal: one transaction, cleared by [`StateOverlay::finalise`]
//! - activations, destructed accounts, unexpected balance delta: one cycle,
//!   reset by [`StateOverlay::commit`]
//! - page counters: one transaction, reset by the caller
//! - recent programs: one block, reset by the caller
//!
//! The overlay is not shared between threads. Parallel executions each get
//! their own overlay and may seed it with a copy of another's recent cache.

use crate::{
    args::StateArgs,
    error::{ActivationError, StateError},
    metrics::OverlayMetrics,
    primitives::{ActivatedWasm, CacheWasm, EvictWasm, UserWasms, WasmCacheOp, WasmTarget},
    state::{
        activation::{ActivatedWasms, AsmMapLookup},
        database::StateDatabase,
        journal::{Journal, JournalEntry, Snapshot},
        ledger::LedgerState,
        object::{Account, StateObject},
        recent::RecentWasms,
    },
};
use alloy_primitives::{Address, Bytes, B256, I256, U256};
use revm::primitives::KECCAK_EMPTY;
use std::collections::{hash_map::Entry, BTreeMap, BTreeSet, HashSet};
use tracing::{debug, trace};

/// Stylus execution data that is not journaled.
#[derive(Debug, Default)]
pub struct StylusExtra {
    user_wasms: Option<UserWasms>,
    /// Pages currently open.
    open_wasm_pages: u16,
    /// Largest number of pages open at once during this transaction.
    ever_wasm_pages: u16,
    recent_wasms: RecentWasms,
    tx_filtered: bool,
}

impl StylusExtra {
    pub fn user_wasms(&self) -> Option<&UserWasms> {
        self.user_wasms.as_ref()
    }

    pub fn take_user_wasms(&mut self) -> Option<UserWasms> {
        self.user_wasms.take()
    }

    pub fn stylus_pages(&self) -> (u16, u16) {
        (self.open_wasm_pages, self.ever_wasm_pages)
    }

    pub fn recent_wasms(&self) -> &RecentWasms {
        &self.recent_wasms
    }
}

type TeardownHook = Box<dyn FnOnce(&mut StylusExtra) + Send>;

/// An account written by a committed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdate {
    pub account: Account,
    /// New code, if it was set during the cycle.
    pub code: Option<Bytes>,
}

/// Everything a cycle changed, for the store to persist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateChangeset {
    /// Accounts whose storage must be wiped before applying the rest.
    pub destructed: BTreeSet<Address>,
    pub accounts: BTreeMap<Address, AccountUpdate>,
    pub storage: BTreeMap<Address, BTreeMap<B256, B256>>,
    pub activated_wasms: BTreeMap<B256, ActivatedWasm>,
    pub wasm_cache_ops: Vec<WasmCacheOp>,
    pub unexpected_balance_delta: I256,
}

#[derive(derive_more::Debug)]
pub struct StateOverlay<DB> {
    #[debug(skip)]
    db: DB,
    args: StateArgs,
    journal: Journal,
    ledger: LedgerState,
    stylus: StylusExtra,
    /// Accounts dirtied by finalised transactions of this cycle.
    pending: HashSet<Address>,
    /// Cache intents of finalised transactions of this cycle.
    pending_cache_ops: Vec<WasmCacheOp>,
    #[debug(skip)]
    metrics: OverlayMetrics,
    #[debug(skip)]
    teardown: Option<TeardownHook>,
}

impl<DB: StateDatabase> StateOverlay<DB> {
    pub fn new(db: DB, args: StateArgs) -> Self {
        let mut overlay = Self {
            db,
            args,
            journal: Journal::new(),
            ledger: LedgerState::default(),
            stylus: StylusExtra::default(),
            pending: HashSet::new(),
            pending_cache_ops: Vec::new(),
            metrics: OverlayMetrics::default(),
            teardown: None,
        };
        if overlay.args.recording {
            overlay.start_recording();
        }
        overlay
    }

    pub fn db(&self) -> &DB {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut DB {
        &mut self.db
    }

    pub fn args(&self) -> &StateArgs {
        &self.args
    }

    pub fn deterministic(&self) -> bool {
        self.args.deterministic || self.args.recording
    }

    pub fn recording(&self) -> bool {
        self.args.recording
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    // ========== Snapshots ==========

    pub fn snapshot(&self) -> Snapshot {
        self.journal.snapshot()
    }

    /// Undoes everything journaled since `snapshot`.
    ///
    /// # Panics
    ///
    /// If `snapshot` was taken before the journal was last cleared.
    pub fn revert_to_snapshot(&mut self, snapshot: Snapshot) {
        let reverted = self.journal.revert_to(snapshot, &mut self.ledger);
        self.metrics.record_revert(reverted);
    }

    // ========== Account objects ==========

    /// The live object at `address`, without consulting the store.
    pub fn state_object(&self, address: &Address) -> Option<&StateObject> {
        self.ledger.objects.get(address)
    }

    /// Current account data, live objects first.
    pub fn account(&self, address: Address) -> Result<Option<Account>, StateError> {
        if let Some(obj) = self.ledger.objects.get(&address) {
            return Ok(Some(obj.data.clone()));
        }
        if self.ledger.destructed.contains(&address) {
            return Ok(None);
        }
        Ok(self.db.account(address)?)
    }

    pub fn exists(&self, address: Address) -> Result<bool, StateError> {
        Ok(self.account(address)?.is_some())
    }

    pub fn balance(&self, address: Address) -> Result<U256, StateError> {
        Ok(self.account(address)?.map(|account| account.balance).unwrap_or_default())
    }

    pub fn nonce(&self, address: Address) -> Result<u64, StateError> {
        Ok(self.account(address)?.map(|account| account.nonce).unwrap_or_default())
    }

    pub fn code_hash(&self, address: Address) -> Result<B256, StateError> {
        Ok(self.account(address)?.map(|account| account.code_hash).unwrap_or_default())
    }

    pub fn code(&self, address: Address) -> Result<Bytes, StateError> {
        if let Some(code) = self.ledger.objects.get(&address).and_then(|obj| obj.code.clone()) {
            return Ok(code);
        }
        match self.account(address)? {
            Some(account) if account.code_hash != KECCAK_EMPTY => {
                Ok(self.db.code_by_hash(account.code_hash)?)
            }
            _ => Ok(Bytes::new()),
        }
    }

    /// Code set during this cycle with the given hash.
    pub(crate) fn live_code(&self, code_hash: B256) -> Option<Bytes> {
        self.ledger
            .objects
            .values()
            .find(|obj| obj.code.is_some() && obj.data.code_hash == code_hash)
            .and_then(|obj| obj.code.clone())
    }

    /// Current value of a storage slot.
    pub fn state(&self, address: Address, key: B256) -> Result<B256, StateError> {
        self.state_ref(address, key)
    }

    pub(crate) fn state_ref(&self, address: Address, key: B256) -> Result<B256, StateError> {
        if let Some(value) = self
            .ledger
            .objects
            .get(&address)
            .and_then(|obj| obj.cached_state(&key))
        {
            return Ok(value);
        }
        // storage of destructed accounts is gone even if they were recreated
        if self.ledger.destructed.contains(&address) {
            return Ok(B256::ZERO);
        }
        Ok(self.db.storage(address, key)?)
    }

    fn get_state_object(&mut self, address: Address) -> Result<Option<&mut StateObject>, StateError> {
        if !self.ledger.objects.contains_key(&address) {
            if self.ledger.destructed.contains(&address) {
                return Ok(None);
            }
            let Some(account) = self.db.account(address)? else {
                return Ok(None);
            };
            self.ledger
                .objects
                .insert(address, StateObject::new(address, account));
        }
        Ok(self.ledger.objects.get_mut(&address))
    }

    fn get_or_new_state_object(&mut self, address: Address) -> Result<&mut StateObject, StateError> {
        if self.get_state_object(address)?.is_none() {
            return self.create_object(address);
        }
        Ok(self
            .ledger
            .objects
            .get_mut(&address)
            .expect("get_state_object leaves a live object"))
    }

    /// Creates a fresh object, replacing any live one.
    fn create_object(&mut self, address: Address) -> Result<&mut StateObject, StateError> {
        let prev = self.get_state_object(address)?.map(|prev| Box::new(prev.clone()));
        let entry = match prev {
            None => JournalEntry::CreateObject { address },
            Some(prev) => {
                let prev_destructed = !self.ledger.destructed.insert(address);
                JournalEntry::ResetObject {
                    prev,
                    prev_destructed,
                }
            }
        };
        self.journal.append(entry);

        let obj = StateObject::new(address, Account::default());
        Ok(match self.ledger.objects.entry(address) {
            Entry::Occupied(mut slot) => {
                slot.insert(obj);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(obj),
        })
    }

    /// Creates an account, keeping the balance of any existing one.
    pub fn create_account(&mut self, address: Address) -> Result<(), StateError> {
        let prev_balance = self
            .get_state_object(address)?
            .map(|prev| prev.data.balance);
        let obj = self.create_object(address)?;
        if let Some(balance) = prev_balance {
            obj.data.balance = balance;
        }
        Ok(())
    }

    /// Credits `amount`.
    ///
    /// Every balance change is booked in the unexpected balance delta. The
    /// two legs of a transfer cancel out, anything else must be announced
    /// with [`Self::expect_balance_mint`] or [`Self::expect_balance_burn`].
    pub fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        if amount.is_zero() {
            return self.touch(address);
        }
        let obj = self.get_or_new_state_object(address)?;
        let new = obj.data.balance.saturating_add(amount);
        self.write_balance(address, new);
        Ok(())
    }

    /// Debits `amount`. The caller has checked the balance suffices.
    pub fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        if amount.is_zero() {
            return Ok(());
        }
        let obj = self.get_or_new_state_object(address)?;
        let new = obj.data.balance.saturating_sub(amount);
        self.write_balance(address, new);
        Ok(())
    }

    pub fn set_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        self.get_or_new_state_object(address)?;
        self.write_balance(address, amount);
        Ok(())
    }

    /// Sets the balance of a live object and books the change.
    fn write_balance(&mut self, address: Address, new: U256) {
        let Some(obj) = self.ledger.objects.get_mut(&address) else {
            return;
        };
        let prev = std::mem::replace(&mut obj.data.balance, new);
        self.ledger.record_unexpected(prev, new);
        self.journal
            .append(JournalEntry::BalanceChange { address, prev });
    }

    /// Announces that `amount` is about to be created out of thin air, so
    /// the matching credit does not count as unexpected.
    pub fn expect_balance_mint(&mut self, amount: U256) {
        let prev = self.ledger.unexpected_balance_delta;
        self.ledger.unexpected_balance_delta = prev.wrapping_sub(I256::from_raw(amount));
        self.journal
            .append(JournalEntry::ExpectedBalanceDelta { prev });
    }

    /// Announces that `amount` is about to be destroyed, so the matching
    /// debit does not count as unexpected.
    pub fn expect_balance_burn(&mut self, amount: U256) {
        let prev = self.ledger.unexpected_balance_delta;
        self.ledger.unexpected_balance_delta = prev.wrapping_add(I256::from_raw(amount));
        self.journal
            .append(JournalEntry::ExpectedBalanceDelta { prev });
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), StateError> {
        let obj = self.get_or_new_state_object(address)?;
        let prev = obj.data.nonce;
        obj.data.nonce = nonce;
        self.journal
            .append(JournalEntry::NonceChange { address, prev });
        Ok(())
    }

    /// Sets the code of `address`. Stylus programs are stored here too,
    /// behind their discriminant.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), StateError> {
        let obj = self.get_or_new_state_object(address)?;
        let prev_code = obj.code.take();
        let prev_hash = obj.data.code_hash;
        obj.set_code(code);
        self.journal.append(JournalEntry::CodeChange {
            address,
            prev_code,
            prev_hash,
        });
        Ok(())
    }

    pub fn set_state(&mut self, address: Address, key: B256, value: B256) -> Result<(), StateError> {
        if self.state_ref(address, key)? == value {
            return Ok(());
        }
        let obj = self.get_or_new_state_object(address)?;
        let prev = obj.set_state(key, value);
        self.journal
            .append(JournalEntry::StorageChange { address, key, prev });
        Ok(())
    }

    /// Marks the account self-destructed and burns its balance.
    ///
    /// The object stays live until the transaction is finalised.
    pub fn self_destruct(&mut self, address: Address) -> Result<(), StateError> {
        let Some(obj) = self.get_state_object(address)? else {
            return Ok(());
        };
        let prev = obj.self_destructed;
        let prev_balance = obj.data.balance;
        obj.self_destructed = true;
        obj.data.balance = U256::ZERO;
        self.ledger.record_unexpected(prev_balance, U256::ZERO);
        self.journal.append(JournalEntry::SelfDestruct {
            address,
            prev,
            prev_balance,
        });
        Ok(())
    }

    pub fn has_self_destructed(&self, address: &Address) -> bool {
        self.ledger
            .objects
            .get(address)
            .is_some_and(|obj| obj.self_destructed)
    }

    pub fn touch(&mut self, address: Address) -> Result<(), StateError> {
        self.get_or_new_state_object(address)?;
        self.journal.append(JournalEntry::Touch { address });
        Ok(())
    }

    /// Leaves an empty account behind at an address destructed in this
    /// cycle, as older ledger versions did when such an account was touched.
    ///
    /// Only the placeholder is journaled, the destruction itself is not.
    pub fn create_zombie_if_deleted(&mut self, address: Address) {
        if self.ledger.objects.contains_key(&address) || !self.ledger.destructed.contains(&address)
        {
            return;
        }
        trace!(target: "stylus_state", %address, "Creating zombie account");
        self.ledger
            .objects
            .insert(address, StateObject::new_zombie(address));
        self.journal.append(JournalEntry::CreateZombie { address });
    }

    /// Self-destructed accounts among those touched by the current journal,
    /// in no particular order.
    pub fn self_destructs(&self) -> Vec<Address> {
        self.journal
            .dirtied()
            .filter(|address| self.has_self_destructed(address))
            .copied()
            .collect()
    }

    /// Whether `address` was destructed earlier in this cycle.
    pub fn is_destructed(&self, address: &Address) -> bool {
        self.ledger.destructed.contains(address)
    }

    // ========== Stylus programs ==========

    /// Adds a newly activated program to the in-flight layer.
    ///
    /// Re-activating a module already in flight is a no-op. Every activation
    /// in a cycle must cover the same targets as the first one.
    pub fn activate_wasm(
        &mut self,
        module_hash: B256,
        asm_map: ActivatedWasm,
    ) -> Result<(), ActivationError> {
        match self.ledger.activated_wasms.activate(module_hash, asm_map) {
            Ok(true) => {
                self.journal
                    .append(JournalEntry::WasmActivation { module_hash });
                self.metrics.wasm_activations.increment(1);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err) => {
                self.metrics.inconsistent_activations.increment(1);
                Err(err)
            }
        }
    }

    pub fn activated_wasms(&self) -> &ActivatedWasms {
        &self.ledger.activated_wasms
    }

    pub fn activated_asm(
        &self,
        target: &WasmTarget,
        module_hash: B256,
    ) -> Result<Option<Bytes>, StateError> {
        Ok(self
            .ledger
            .activated_wasms
            .activated_asm(&self.db, target, module_hash)?)
    }

    pub fn activated_asm_map(
        &self,
        targets: &[WasmTarget],
        module_hash: B256,
    ) -> Result<AsmMapLookup, ActivationError> {
        self.ledger
            .activated_wasms
            .activated_asm_map(&self.db, targets, module_hash)
    }

    /// Starts collecting every program used, replacing earlier recordings.
    pub fn start_recording(&mut self) {
        self.stylus.user_wasms = Some(UserWasms::new());
    }

    /// Records the asm of a program used by this execution.
    ///
    /// Fails unless asm exists for every target, even when not recording.
    pub fn record_program(
        &mut self,
        targets: &[WasmTarget],
        module_hash: B256,
    ) -> Result<(), ActivationError> {
        if targets.is_empty() {
            return Ok(());
        }
        let lookup = self.activated_asm_map(targets, module_hash)?;
        if !lookup.is_complete() {
            return Err(ActivationError::MissingTargets {
                module_hash,
                missing: lookup.missing_targets,
            });
        }
        if let Some(user_wasms) = &mut self.stylus.user_wasms {
            user_wasms.insert(module_hash, lookup.asm_map);
        }
        Ok(())
    }

    pub fn user_wasms(&self) -> Option<&UserWasms> {
        self.stylus.user_wasms()
    }

    pub fn record_cache_wasm(&mut self, wasm: CacheWasm) {
        self.journal.append(JournalEntry::CacheWasm(wasm));
    }

    pub fn record_evict_wasm(&mut self, wasm: EvictWasm) {
        self.journal.append(JournalEntry::EvictWasm(wasm));
    }

    pub fn recent_wasms(&self) -> &RecentWasms {
        &self.stylus.recent_wasms
    }

    pub fn recent_wasms_mut(&mut self) -> &mut RecentWasms {
        &mut self.stylus.recent_wasms
    }

    /// Notes a program call, returning true if it ran recently in this block.
    pub fn insert_recent_wasm(&mut self, module_hash: B256) -> bool {
        let hit = self
            .stylus
            .recent_wasms
            .insert(module_hash, self.args.block_cache_size);
        self.metrics.record_recent_wasm(hit);
        trace!(target: "stylus_state", %module_hash, hit, "Recent wasm lookup");
        hit
    }

    /// Replaces the recent program cache, at block boundaries or when
    /// branching from another execution.
    pub fn set_recent_wasms(&mut self, recent_wasms: RecentWasms) {
        self.stylus.recent_wasms = recent_wasms;
    }

    // ========== Page counters ==========

    pub fn stylus_pages(&self) -> (u16, u16) {
        self.stylus.stylus_pages()
    }

    pub fn stylus_pages_open(&self) -> u16 {
        self.stylus.open_wasm_pages
    }

    pub fn set_stylus_pages_open(&mut self, open: u16) {
        self.stylus.open_wasm_pages = open;
    }

    /// Tracks that `new` additional pages have been opened, returning the
    /// previous counts.
    pub fn add_stylus_pages(&mut self, new: u16) -> (u16, u16) {
        let (open, ever) = self.stylus_pages();
        self.stylus.open_wasm_pages = open.saturating_add(new);
        self.stylus.ever_wasm_pages = ever.max(self.stylus.open_wasm_pages);
        (open, ever)
    }

    pub fn add_stylus_pages_ever(&mut self, new: u16) {
        self.stylus.ever_wasm_pages = self.stylus.ever_wasm_pages.saturating_add(new);
    }

    // ========== Misc ==========

    /// Total unexpected balance change since the last commit.
    pub fn unexpected_balance_delta(&self) -> I256 {
        self.ledger.unexpected_balance_delta
    }

    pub fn filter_tx(&mut self) {
        self.stylus.tx_filtered = true;
    }

    pub fn clear_tx_filter(&mut self) {
        self.stylus.tx_filtered = false;
    }

    pub fn is_tx_filtered(&self) -> bool {
        self.stylus.tx_filtered
    }

    /// Fails with [`StateError::TxFiltered`] once the current transaction
    /// has been flagged, so execution can abort it.
    pub fn check_tx_filter(&self) -> Result<(), StateError> {
        if self.stylus.tx_filtered {
            return Err(StateError::TxFiltered);
        }
        Ok(())
    }

    // ========== Lifecycle ==========

    /// Ends a transaction: removes self-destructed (and, if asked, empty)
    /// accounts, moves dirty storage to pending and clears the journal.
    pub fn finalise(&mut self, delete_empty_objects: bool) {
        let dirtied: Vec<Address> = self.journal.dirtied().copied().collect();
        let mut deleted = 0usize;
        for address in dirtied {
            let Some(obj) = self.ledger.objects.get_mut(&address) else {
                continue;
            };
            if obj.self_destructed || (delete_empty_objects && obj.is_empty() && !obj.zombie) {
                self.ledger.objects.remove(&address);
                self.ledger.destructed.insert(address);
                self.pending.remove(&address);
                deleted += 1;
            } else {
                obj.finalise();
                self.pending.insert(address);
            }
        }
        self.pending_cache_ops.extend(self.journal.wasm_cache_ops());
        debug!(
            target: "stylus_state",
            journal_len = self.journal.len(),
            deleted,
            pending = self.pending.len(),
            "Finalised transaction"
        );
        self.journal.reset();
    }

    /// Ends a cycle. Returns everything that changed since the previous
    /// commit and resets the in-flight activations, the destructed set and
    /// the unexpected balance delta.
    ///
    /// The caller persists the changeset before reading through the overlay
    /// again.
    pub fn commit(&mut self, delete_empty_objects: bool) -> StateChangeset {
        self.finalise(delete_empty_objects);

        let mut changeset = StateChangeset {
            destructed: self.ledger.destructed.drain().collect(),
            activated_wasms: self.ledger.activated_wasms.take().into_iter().collect(),
            wasm_cache_ops: std::mem::take(&mut self.pending_cache_ops),
            unexpected_balance_delta: std::mem::replace(
                &mut self.ledger.unexpected_balance_delta,
                I256::ZERO,
            ),
            ..Default::default()
        };
        for address in self.pending.drain() {
            let Some(obj) = self.ledger.objects.get_mut(&address) else {
                continue;
            };
            changeset.accounts.insert(
                address,
                AccountUpdate {
                    account: obj.data.clone(),
                    code: obj.code.clone(),
                },
            );
            if !obj.pending_storage.is_empty() {
                changeset
                    .storage
                    .insert(address, obj.pending_storage.drain().collect());
            }
        }

        debug!(
            target: "stylus_state",
            accounts = changeset.accounts.len(),
            destructed = changeset.destructed.len(),
            activated_wasms = changeset.activated_wasms.len(),
            "Committed state overlay"
        );
        changeset
    }

    /// Registers a hook that [`Self::teardown`] runs over the Stylus data.
    pub fn on_teardown(&mut self, hook: impl FnOnce(&mut StylusExtra) + Send + 'static) {
        self.teardown = Some(Box::new(hook));
    }

    /// Releases the overlay, running the teardown hook if one is set, and
    /// hands back the database.
    pub fn teardown(mut self) -> DB {
        if let Some(hook) = self.teardown.take() {
            hook(&mut self.stylus);
        }
        self.db
    }
}
