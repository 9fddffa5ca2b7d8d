//! Unit tests for the generation use case over mocked stores.

use std::sync::Arc;

use rstest::{fixture, rstest};

use super::{GenerationService, GenerationServiceConfig, GenerationServicePorts};
use crate::domain::ports::{
    ChargedAppend, FixtureStyleCatalog, MockLedgerStore, MockOutcomeLog, MockStyleCatalog,
    NoOpSettlementSideEffects, ProviderError, StyleCatalogError,
};
use crate::domain::{
    Account, AccountId, Charge, EligibilityGate, ErrorCode, GenerationOrchestrator,
    GenerationOrchestratorConfig, GenerationOutcome, GenerationLimiter, OrchestratorRuntime,
    OutcomeStatus, QualityTier, Settlement, SettlementCoordinator, Style, StyleId,
};
use crate::test_support::generation::{
    ImmediateSleeper, MutableClock, NoJitter, ScriptedProvider, fixed_now, reference_images,
};

const ACCOUNT: i64 = 501;

#[fixture]
fn styles() -> Vec<Style> {
    vec![
        Style {
            id: StyleId::new(1),
            title: "Film noir".to_owned(),
            prompt: None,
            is_active: true,
        },
        Style {
            id: StyleId::new(2),
            title: "Retro".to_owned(),
            prompt: Some("warm 1970s film stock".to_owned()),
            is_active: true,
        },
        Style {
            id: StyleId::new(3),
            title: "Retired".to_owned(),
            prompt: None,
            is_active: false,
        },
    ]
}

fn ledger_with(account: Account) -> MockLedgerStore {
    let mut ledger = MockLedgerStore::new();
    ledger
        .expect_find_or_create()
        .returning(move |_| Ok(account.clone()));
    ledger
}

fn funded(balance: u64) -> Account {
    let mut account = Account::empty(AccountId::new(ACCOUNT));
    account.balance = balance;
    account
}

fn charging_log() -> MockOutcomeLog {
    let mut log = MockOutcomeLog::new();
    log.expect_append_with_charge().returning(|_, price, record| {
        let charge = Charge::Balance { amount: price };
        Ok(ChargedAppend::Recorded {
            outcome: GenerationOutcome {
                id: 9,
                record: record.clone().with_charge(charge),
            },
            charge,
        })
    });
    log.expect_append().returning(|record| {
        Ok(GenerationOutcome {
            id: 10,
            record: record.clone(),
        })
    });
    log
}

fn service(
    styles: Vec<Style>,
    ledger: MockLedgerStore,
    log: MockOutcomeLog,
    provider: Arc<ScriptedProvider>,
) -> GenerationService {
    service_with_catalog(Arc::new(FixtureStyleCatalog::new(styles)), ledger, log, provider)
}

fn service_with_catalog(
    catalog: Arc<dyn crate::domain::ports::StyleCatalog>,
    ledger: MockLedgerStore,
    log: MockOutcomeLog,
    provider: Arc<ScriptedProvider>,
) -> GenerationService {
    let orchestrator = GenerationOrchestrator::with_runtime(
        provider,
        GenerationLimiter::new(3),
        OrchestratorRuntime {
            sleeper: Arc::new(ImmediateSleeper),
            jitter: Arc::new(NoJitter),
        },
        GenerationOrchestratorConfig::default(),
    );
    GenerationService::new(
        GenerationServicePorts {
            styles: catalog,
            gate: EligibilityGate::new(Arc::new(ledger)),
            orchestrator: Arc::new(orchestrator),
            settlement: SettlementCoordinator::new(
                Arc::new(log),
                Arc::new(NoOpSettlementSideEffects),
                Arc::new(MutableClock::new(fixed_now())),
                "test-provider",
            ),
        },
        GenerationServiceConfig::default(),
    )
}

#[rstest]
#[tokio::test]
async fn delivers_image_and_uses_default_prompt(styles: Vec<Style>) {
    let provider = Arc::new(ScriptedProvider::new([]));
    let subject = service(styles, ledger_with(funded(100)), charging_log(), provider.clone());

    let settlement = subject
        .generate(AccountId::new(ACCOUNT), StyleId::new(1), reference_images(1))
        .await
        .expect("generation runs");

    let Settlement::Delivered { outcome, charge, .. } = settlement else {
        panic!("expected delivery, got {settlement:?}");
    };
    assert_eq!(charge, Charge::Balance { amount: 50 });
    assert_eq!(outcome.record.status, OutcomeStatus::Success);
    assert_eq!(outcome.record.style_title, "Film noir");
    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("\"Film noir\""));
}

#[rstest]
#[tokio::test]
async fn custom_style_prompt_is_sent_verbatim(styles: Vec<Style>) {
    let provider = Arc::new(ScriptedProvider::new([]));
    let subject = service(styles, ledger_with(funded(100)), charging_log(), provider.clone());

    subject
        .request_generation(AccountId::new(ACCOUNT), StyleId::new(2), reference_images(1))
        .await
        .expect("image delivered");

    assert_eq!(provider.prompts(), vec!["warm 1970s film stock".to_owned()]);
}

#[rstest]
#[tokio::test]
async fn reference_images_are_capped(styles: Vec<Style>) {
    let provider = Arc::new(ScriptedProvider::new([]));
    let mut log = MockOutcomeLog::new();
    log.expect_append_with_charge()
        .withf(|_, _, record| record.input_photo_count == 4)
        .times(1)
        .returning(|_, _, record| {
            Ok(ChargedAppend::Recorded {
                outcome: GenerationOutcome {
                    id: 1,
                    record: record.clone(),
                },
                charge: Charge::Credit,
            })
        });
    let subject = service(styles, ledger_with(funded(100)), log, provider.clone());

    subject
        .request_generation(AccountId::new(ACCOUNT), StyleId::new(1), reference_images(7))
        .await
        .expect("image delivered");

    assert_eq!(provider.image_counts(), vec![4]);
}

#[rstest]
#[tokio::test]
async fn empty_image_list_is_rejected_before_any_io(styles: Vec<Style>) {
    let provider = Arc::new(ScriptedProvider::new([]));
    let mut ledger = MockLedgerStore::new();
    ledger.expect_find_or_create().never();
    let mut log = MockOutcomeLog::new();
    log.expect_append().never();
    let subject = service(styles, ledger, log, provider.clone());

    let error = subject
        .request_generation(AccountId::new(ACCOUNT), StyleId::new(1), Vec::new())
        .await
        .expect_err("rejected");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert_eq!(provider.calls(), 0);
}

#[rstest]
#[case::unknown(99)]
#[case::inactive(3)]
#[tokio::test]
async fn unknown_or_inactive_style_is_not_found(styles: Vec<Style>, #[case] style_id: i64) {
    let provider = Arc::new(ScriptedProvider::new([]));
    let subject = service(styles, MockLedgerStore::new(), MockOutcomeLog::new(), provider.clone());

    let error = subject
        .request_generation(AccountId::new(ACCOUNT), StyleId::new(style_id), reference_images(1))
        .await
        .expect_err("style missing");

    assert_eq!(error.code(), ErrorCode::NotFound);
    assert_eq!(provider.calls(), 0);
}

#[rstest]
#[tokio::test]
async fn gate_refusal_records_nothing(styles: Vec<Style>) {
    let provider = Arc::new(ScriptedProvider::new([]));
    let mut log = MockOutcomeLog::new();
    log.expect_append().never();
    log.expect_append_with_charge().never();
    let subject = service(styles, ledger_with(funded(49)), log, provider.clone());

    let error = subject
        .request_generation(AccountId::new(ACCOUNT), StyleId::new(1), reference_images(1))
        .await
        .expect_err("refused");

    assert_eq!(error.code(), ErrorCode::InsufficientFunds);
    assert_eq!(provider.calls(), 0);
}

#[rstest]
#[tokio::test]
async fn provider_failure_returns_generic_error(styles: Vec<Style>) {
    let provider = Arc::new(ScriptedProvider::always_failing(ProviderError::bad_request(
        "safety filter",
    )));
    let mut log = MockOutcomeLog::new();
    log.expect_append_with_charge().never();
    log.expect_append()
        .times(1)
        .returning(|record| {
            Ok(GenerationOutcome {
                id: 2,
                record: record.clone(),
            })
        });
    let subject = service(styles, ledger_with(funded(100)), log, provider.clone());

    let error = subject
        .request_generation(AccountId::new(ACCOUNT), StyleId::new(1), reference_images(1))
        .await
        .expect_err("provider failed");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    assert!(!error.message().contains("safety filter"));
    assert_eq!(provider.calls(), 1);
    assert_eq!(provider.tiers(), vec![QualityTier::High]);
}

#[rstest]
#[tokio::test]
async fn catalogue_outage_is_unavailable() {
    let mut catalog = MockStyleCatalog::new();
    catalog
        .expect_find_style()
        .returning(|_| Err(StyleCatalogError::connection("refused")));
    let subject = service_with_catalog(
        Arc::new(catalog),
        MockLedgerStore::new(),
        MockOutcomeLog::new(),
        Arc::new(ScriptedProvider::new([])),
    );

    let error = subject
        .request_generation(AccountId::new(ACCOUNT), StyleId::new(1), reference_images(1))
        .await
        .expect_err("catalogue down");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}
