//! Atomicity and bookkeeping of the in-process adapter.

use std::sync::Arc;

use futures::future::join_all;
use rstest::{fixture, rstest};
use uuid::Uuid;

use super::MemoryStore;
use crate::domain::ports::{ChargedAppend, LedgerStore, OutcomeLog, PromoStore};
use crate::domain::{
    Account, AccountId, Charge, NewPromoCode, OutcomeRecord, OutcomeStatus, PromoCodeValue,
    PromoPolicy, PromoRedemptionOutcome, QualityTier, SpendDecision, StyleId,
};
use crate::test_support::generation::{MutableClock, fixed_now};

const ACCOUNT: AccountId = AccountId::new(77);

#[fixture]
fn store() -> MemoryStore {
    MemoryStore::new(Arc::new(MutableClock::new(fixed_now())))
}

fn funded(credits: u32, balance: u64) -> Account {
    Account {
        credits,
        balance,
        ..Account::empty(ACCOUNT)
    }
}

fn success_record() -> OutcomeRecord {
    OutcomeRecord {
        request_id: Uuid::new_v4(),
        account_id: ACCOUNT,
        style_id: StyleId::new(1),
        style_title: "Noir".to_owned(),
        status: OutcomeStatus::Success,
        failure_kind: None,
        charged_amount: 0,
        charged_credits: 0,
        provider: "memory".to_owned(),
        quality_tier: QualityTier::High,
        attempts: 1,
        error_message: None,
        input_photo_count: 1,
        created_at: fixed_now(),
    }
}

#[rstest]
#[case::credit_first(funded(1, 100), SpendDecision::Charged(Charge::Credit), funded(0, 100))]
#[case::balance(funded(0, 100), SpendDecision::Charged(Charge::Balance { amount: 50 }), funded(0, 50))]
#[case::declined(funded(0, 49), SpendDecision::Declined, funded(0, 49))]
#[tokio::test]
async fn try_spend_prefers_credits_and_never_clamps(
    store: MemoryStore,
    #[case] before: Account,
    #[case] expected: SpendDecision,
    #[case] after: Account,
) {
    store.insert_account(before);

    let decision = store.try_spend(ACCOUNT, 50).await.expect("spend runs");

    assert_eq!(decision, expected);
    assert_eq!(store.find(ACCOUNT).await.expect("find"), Some(after));
}

#[rstest]
#[tokio::test]
async fn concurrent_spends_of_one_credit_charge_once(store: MemoryStore) {
    store.insert_account(funded(1, 0));

    let decisions = join_all((0..2).map(|_| store.try_spend(ACCOUNT, 50))).await;

    let charged = decisions
        .into_iter()
        .map(|decision| decision.expect("spend runs"))
        .filter(|decision| decision.is_charged())
        .count();
    assert_eq!(charged, 1);
    assert_eq!(store.find(ACCOUNT).await.expect("find").map(|a| a.credits), Some(0));
}

#[rstest]
#[tokio::test]
async fn declined_charge_writes_nothing(store: MemoryStore) {
    store.insert_account(funded(0, 10));

    let result = store
        .append_with_charge(ACCOUNT, 50, &success_record())
        .await
        .expect("append runs");

    assert_eq!(result, ChargedAppend::Declined);
    assert!(store.outcomes().is_empty());
    assert_eq!(store.stats(ACCOUNT).await.expect("stats"), None);
}

#[rstest]
#[tokio::test]
async fn admin_charge_is_waived(store: MemoryStore) {
    store.insert_account(Account {
        is_admin: true,
        ..funded(0, 0)
    });

    let ChargedAppend::Recorded { charge, outcome } = store
        .append_with_charge(ACCOUNT, 50, &success_record())
        .await
        .expect("append runs")
    else {
        panic!("admin charge should be recorded");
    };

    assert_eq!(charge, Charge::Waived);
    assert_eq!(outcome.record.charged_amount, 0);
}

#[rstest]
#[tokio::test]
async fn charged_append_rolls_stats_forward(store: MemoryStore) {
    store.insert_account(funded(0, 100));

    store
        .append_with_charge(ACCOUNT, 50, &success_record())
        .await
        .expect("append runs");

    let stats = store.stats(ACCOUNT).await.expect("stats").expect("present");
    assert_eq!(stats.spent_amount, 50);
    assert_eq!(stats.generations_succeeded, 1);
    assert_eq!(stats.last_generation_at, Some(fixed_now()));
    let report = store
        .report(fixed_now() - chrono::TimeDelta::days(1))
        .await
        .expect("report");
    assert_eq!(report.charged_amount, 50);
}

#[rstest]
#[tokio::test]
async fn duplicate_request_ids_are_rejected(store: MemoryStore) {
    let record = success_record();
    store.append(&record).await.expect("first append");

    assert!(store.append(&record).await.is_err());
    assert_eq!(store.outcomes().len(), 1);
}

#[rstest]
#[case::single_use(PromoPolicy::SingleUse, 0, false)]
#[case::counted(PromoPolicy::Counted, 2, true)]
#[tokio::test]
async fn redemption_applies_policy(
    store: MemoryStore,
    #[case] policy: PromoPolicy,
    #[case] remaining: u32,
    #[case] active: bool,
) {
    let code = NewPromoCode::try_new("spring", 2, 3).expect("valid code");
    store.create(&code).await.expect("created");

    let outcome = store
        .redeem(ACCOUNT, &code.code, 50, policy)
        .await
        .expect("redeem runs");

    assert_eq!(
        outcome,
        PromoRedemptionOutcome::Redeemed {
            granted: 100,
            generations: 2
        }
    );
    let stored = store
        .find_by_code(&code.code)
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!((stored.remaining_uses, stored.is_active), (remaining, active));
    assert_eq!(store.find(ACCOUNT).await.expect("find").map(|a| a.balance), Some(100));
}

#[rstest]
#[tokio::test]
async fn second_redemption_reports_already_used_before_inactive(store: MemoryStore) {
    let code = NewPromoCode::try_new("welcome", 1, 1).expect("valid code");
    store.create(&code).await.expect("created");
    store
        .redeem(ACCOUNT, &code.code, 50, PromoPolicy::SingleUse)
        .await
        .expect("first redemption");

    let again = store
        .redeem(ACCOUNT, &code.code, 50, PromoPolicy::SingleUse)
        .await
        .expect("second redemption");

    assert_eq!(again, PromoRedemptionOutcome::AlreadyUsed);
    assert_eq!(store.find(ACCOUNT).await.expect("find").map(|a| a.balance), Some(50));
}

#[rstest]
#[tokio::test]
async fn concurrent_redemptions_grant_once(store: MemoryStore) {
    let code = NewPromoCode::try_new("race", 1, 10).expect("valid code");
    store.create(&code).await.expect("created");

    let outcomes = join_all(
        (0..4).map(|_| store.redeem(ACCOUNT, &code.code, 50, PromoPolicy::Counted)),
    )
    .await;

    let redeemed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(PromoRedemptionOutcome::Redeemed { .. })))
        .count();
    assert_eq!(redeemed, 1);
    assert_eq!(store.find(ACCOUNT).await.expect("find").map(|a| a.balance), Some(50));
}

#[rstest]
#[tokio::test]
async fn unknown_codes_are_invalid(store: MemoryStore) {
    let code = PromoCodeValue::parse("missing").expect("valid text");

    let outcome = store
        .redeem(ACCOUNT, &code, 50, PromoPolicy::SingleUse)
        .await
        .expect("redeem runs");

    assert_eq!(outcome, PromoRedemptionOutcome::Invalid);
}

#[rstest]
#[tokio::test]
async fn deleting_a_code_forgets_its_redemptions(store: MemoryStore) {
    let code = NewPromoCode::try_new("gone", 1, 1).expect("valid code");
    let created = store.create(&code).await.expect("created");

    assert!(store.delete(created.id).await.expect("delete"));
    assert!(!store.delete(created.id).await.expect("second delete"));
    assert!(store.list().await.expect("list").is_empty());
}

#[rstest]
#[tokio::test]
async fn admin_adjustments_clamp_at_zero(store: MemoryStore) {
    store.insert_account(funded(2, 30));

    let account = store.adjust_credits(ACCOUNT, -5).await.expect("credits");
    assert_eq!(account.credits, 0);
    let account = store.adjust_balance(ACCOUNT, -100).await.expect("balance");
    assert_eq!(account.balance, 0);
}
