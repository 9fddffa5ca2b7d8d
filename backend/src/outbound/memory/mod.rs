//! In-process adapter for the ledger, outcome log, promo, and style ports.
//!
//! All state lives behind one mutex, so every port operation is atomic: the
//! spend decision, the charge, and the outcome append happen under a single
//! guard, mirroring the row locks of the Diesel adapters. Used by the
//! integration suite and by local runs without a database.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;

use crate::domain::ports::{
    ChargedAppend, LedgerStore, LedgerStoreError, OutcomeLog, OutcomeLogError, PromoStore,
    PromoStoreError, StyleCatalog, StyleCatalogError,
};
use crate::domain::{
    Account, AccountId, AccountStats, Charge, GenerationOutcome, NewPromoCode, OutcomeRecord,
    OutcomeReport, PromoCode, PromoCodeValue, PromoPolicy, PromoRedemptionOutcome, SpendDecision,
    Style, StyleId,
};

const POISONED: &str = "in-memory state lock poisoned";

#[derive(Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    stats: BTreeMap<AccountId, AccountStats>,
    outcomes: Vec<GenerationOutcome>,
    request_ids: HashSet<uuid::Uuid>,
    promos: BTreeMap<i64, PromoCode>,
    redemptions: HashSet<(i64, AccountId)>,
    styles: BTreeMap<StyleId, Style>,
    next_promo_id: i64,
}

impl MemoryState {
    fn account_mut(&mut self, account_id: AccountId) -> &mut Account {
        self.accounts
            .entry(account_id)
            .or_insert_with(|| Account::empty(account_id))
    }

    fn append(&mut self, record: OutcomeRecord) -> Result<GenerationOutcome, OutcomeLogError> {
        if !self.request_ids.insert(record.request_id) {
            return Err(OutcomeLogError::query(format!(
                "outcome for request {} already recorded",
                record.request_id
            )));
        }
        self.account_mut(record.account_id);
        self.stats
            .entry(record.account_id)
            .or_insert_with(|| AccountStats::empty(record.account_id))
            .record(&record);
        let id = i64::try_from(self.outcomes.len()).unwrap_or(i64::MAX).saturating_add(1);
        let outcome = GenerationOutcome { id, record };
        self.outcomes.push(outcome.clone());
        Ok(outcome)
    }
}

/// Mutex-guarded store implementing every persistence port.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Empty store stamping records with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                next_promo_id: 1,
                ..MemoryState::default()
            })),
            clock,
        }
    }

    /// Add or replace a catalogue style.
    pub fn insert_style(&self, style: Style) {
        if let Ok(mut state) = self.state.lock() {
            state.styles.insert(style.id, style);
        }
    }

    /// Add or replace an account.
    pub fn insert_account(&self, account: Account) {
        if let Ok(mut state) = self.state.lock() {
            state.accounts.insert(account.id, account);
        }
    }

    /// Every outcome appended so far, oldest first.
    pub fn outcomes(&self) -> Vec<GenerationOutcome> {
        self.state
            .lock()
            .map(|state| state.outcomes.clone())
            .unwrap_or_default()
    }

    fn lock<E>(&self, poisoned: impl FnOnce(&'static str) -> E) -> Result<MutexGuard<'_, MemoryState>, E> {
        self.state.lock().map_err(|_| poisoned(POISONED))
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_or_create(&self, account_id: AccountId) -> Result<Account, LedgerStoreError> {
        let mut state = self.lock(LedgerStoreError::query)?;
        Ok(state.account_mut(account_id).clone())
    }

    async fn find(&self, account_id: AccountId) -> Result<Option<Account>, LedgerStoreError> {
        let state = self.lock(LedgerStoreError::query)?;
        Ok(state.accounts.get(&account_id).cloned())
    }

    async fn try_spend(
        &self,
        account_id: AccountId,
        price: u64,
    ) -> Result<SpendDecision, LedgerStoreError> {
        let mut state = self.lock(LedgerStoreError::query)?;
        let account = state.account_mut(account_id);
        let Some(charge) = account.plan_spend(price) else {
            return Ok(SpendDecision::Declined);
        };
        *account = account.after_charge(charge);
        Ok(SpendDecision::Charged(charge))
    }

    async fn adjust_credits(
        &self,
        account_id: AccountId,
        delta: i64,
    ) -> Result<Account, LedgerStoreError> {
        let mut state = self.lock(LedgerStoreError::query)?;
        let account = state.account_mut(account_id);
        *account = account.with_credit_delta(delta);
        Ok(account.clone())
    }

    async fn adjust_balance(
        &self,
        account_id: AccountId,
        delta: i64,
    ) -> Result<Account, LedgerStoreError> {
        let mut state = self.lock(LedgerStoreError::query)?;
        let account = state.account_mut(account_id);
        *account = account.with_balance_delta(delta);
        Ok(account.clone())
    }

    async fn clear_balance(&self, account_id: AccountId) -> Result<Account, LedgerStoreError> {
        let mut state = self.lock(LedgerStoreError::query)?;
        let account = state.account_mut(account_id);
        account.balance = 0;
        Ok(account.clone())
    }

    async fn set_admin(
        &self,
        account_id: AccountId,
        is_admin: bool,
    ) -> Result<Account, LedgerStoreError> {
        let mut state = self.lock(LedgerStoreError::query)?;
        let account = state.account_mut(account_id);
        account.is_admin = is_admin;
        Ok(account.clone())
    }
}

#[async_trait]
impl OutcomeLog for MemoryStore {
    async fn append(&self, record: &OutcomeRecord) -> Result<GenerationOutcome, OutcomeLogError> {
        let mut state = self.lock(OutcomeLogError::query)?;
        state.append(record.clone())
    }

    async fn append_with_charge(
        &self,
        account_id: AccountId,
        price: u64,
        record: &OutcomeRecord,
    ) -> Result<ChargedAppend, OutcomeLogError> {
        let mut state = self.lock(OutcomeLogError::query)?;
        if state.request_ids.contains(&record.request_id) {
            return Err(OutcomeLogError::query(format!(
                "outcome for request {} already recorded",
                record.request_id
            )));
        }
        let account = state.account_mut(account_id);
        let charge = if account.is_admin {
            Charge::Waived
        } else {
            let Some(charge) = account.plan_spend(price) else {
                return Ok(ChargedAppend::Declined);
            };
            *account = account.after_charge(charge);
            charge
        };
        let outcome = state.append(record.clone().with_charge(charge))?;
        Ok(ChargedAppend::Recorded { outcome, charge })
    }

    async fn report(&self, since: DateTime<Utc>) -> Result<OutcomeReport, OutcomeLogError> {
        let state = self.lock(OutcomeLogError::query)?;
        let mut report = OutcomeReport::default();
        for outcome in state
            .outcomes
            .iter()
            .filter(|outcome| outcome.record.created_at >= since)
        {
            let record = &outcome.record;
            report.add(record.status, record.charged_amount, record.charged_credits);
        }
        Ok(report)
    }

    async fn stats(
        &self,
        account_id: AccountId,
    ) -> Result<Option<AccountStats>, OutcomeLogError> {
        let state = self.lock(OutcomeLogError::query)?;
        Ok(state.stats.get(&account_id).copied())
    }
}

#[async_trait]
impl PromoStore for MemoryStore {
    async fn redeem(
        &self,
        account_id: AccountId,
        code: &PromoCodeValue,
        price: u64,
        policy: PromoPolicy,
    ) -> Result<PromoRedemptionOutcome, PromoStoreError> {
        let mut state = self.lock(PromoStoreError::query)?;
        let Some(promo) = state.promos.values().find(|promo| &promo.code == code).cloned() else {
            return Ok(PromoRedemptionOutcome::Invalid);
        };
        if state.redemptions.contains(&(promo.id, account_id)) {
            return Ok(PromoRedemptionOutcome::AlreadyUsed);
        }
        let Some(grant) = promo.redeemable_grant(price) else {
            return Ok(PromoRedemptionOutcome::Invalid);
        };
        let delta = i64::try_from(grant)
            .map_err(|_| PromoStoreError::query("grant exceeds ledger range"))?;

        let now = self.now();
        state.redemptions.insert((promo.id, account_id));
        let account = state.account_mut(account_id);
        *account = account.with_balance_delta(delta);
        let (remaining_uses, is_active) = promo.after_redemption(policy);
        if let Some(stored) = state.promos.get_mut(&promo.id) {
            stored.remaining_uses = remaining_uses;
            stored.is_active = is_active;
            stored.updated_at = now;
        }
        Ok(PromoRedemptionOutcome::Redeemed {
            granted: grant,
            generations: promo.granted_generations,
        })
    }

    async fn create(&self, code: &NewPromoCode) -> Result<PromoCode, PromoStoreError> {
        let mut state = self.lock(PromoStoreError::query)?;
        if state.promos.values().any(|promo| promo.code == code.code) {
            return Err(PromoStoreError::duplicate_code(code.code.to_string()));
        }
        let now = self.now();
        let id = state.next_promo_id;
        state.next_promo_id = id.saturating_add(1);
        let promo = PromoCode {
            id,
            code: code.code.clone(),
            granted_generations: code.granted_generations,
            remaining_uses: code.remaining_uses,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.promos.insert(id, promo.clone());
        Ok(promo)
    }

    async fn list(&self) -> Result<Vec<PromoCode>, PromoStoreError> {
        let state = self.lock(PromoStoreError::query)?;
        let mut promos = state.promos.values().cloned().collect::<Vec<_>>();
        promos.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(promos)
    }

    async fn find_by_code(
        &self,
        code: &PromoCodeValue,
    ) -> Result<Option<PromoCode>, PromoStoreError> {
        let state = self.lock(PromoStoreError::query)?;
        Ok(state.promos.values().find(|promo| &promo.code == code).cloned())
    }

    async fn set_active(
        &self,
        id: i64,
        is_active: bool,
    ) -> Result<Option<PromoCode>, PromoStoreError> {
        let now = self.now();
        let mut state = self.lock(PromoStoreError::query)?;
        Ok(state.promos.get_mut(&id).map(|promo| {
            promo.is_active = is_active;
            promo.updated_at = now;
            promo.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, PromoStoreError> {
        let mut state = self.lock(PromoStoreError::query)?;
        let removed = state.promos.remove(&id).is_some();
        state.redemptions.retain(|(promo_id, _)| *promo_id != id);
        Ok(removed)
    }
}

#[async_trait]
impl StyleCatalog for MemoryStore {
    async fn find_style(&self, style_id: StyleId) -> Result<Option<Style>, StyleCatalogError> {
        let state = self.lock(StyleCatalogError::query)?;
        Ok(state.styles.get(&style_id).cloned())
    }
}

#[cfg(test)]
mod tests;
