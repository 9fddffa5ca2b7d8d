//! Unit tests for the architecture lint.

use std::path::PathBuf;

use rstest::fixture;
use rstest::rstest;

use super::*;

#[derive(Clone, Copy)]
struct LintSingle;

impl LintSingle {
    fn lint(self, file: &str, contents: &str) -> Result<(), ArchitectureLintError> {
        lint_sources(&[LintSource {
            file: PathBuf::from(file),
            contents: contents.to_owned(),
        }])
    }
}

#[fixture]
fn lint_single() -> LintSingle {
    LintSingle
}

#[rstest]
#[case::domain_uses_own_ports(
    "domain/settlement/mod.rs",
    "use crate::domain::ports::OutcomeLog; fn settle(_log: &dyn OutcomeLog) {}",
    true
)]
#[case::domain_reaches_outbound(
    "domain/generation_service/mod.rs",
    "use crate::outbound::persistence::DieselLedgerStore; fn wire() { let _ = DieselLedgerStore::new; }",
    false
)]
#[case::domain_reaches_outbound_via_crate_name(
    "domain/eligibility.rs",
    "use photoshoot_backend::outbound::memory::MemoryStore; fn wire() { let _ = MemoryStore::new; }",
    false
)]
#[case::domain_reads_settings(
    "domain/promo_service.rs",
    "use crate::settings::PipelineSettings; fn price(s: &PipelineSettings) -> u64 { s.price() }",
    false
)]
#[case::domain_uses_diesel(
    "domain/account.rs",
    "use diesel::prelude::*; fn lock() {}",
    false
)]
#[case::domain_uses_reqwest(
    "domain/ports/generation_provider.rs",
    "fn call() { let _ = reqwest::Client::new(); }",
    false
)]
#[case::domain_glob_imports_diesel(
    "domain/outcome.rs",
    "use diesel::*; fn count() {}",
    false
)]
#[case::domain_relative_sibling_module(
    "domain/settlement/tests.rs",
    "use super::super::ports::OutcomeLog; use self::helpers::*; mod helpers {}",
    true
)]
#[case::outbound_implements_domain_port(
    "outbound/provider/http_provider.rs",
    "use crate::domain::ports::GenerationProvider; use reqwest::Client; struct Http(Client);",
    true
)]
#[case::outbound_reads_settings(
    "outbound/persistence/pool.rs",
    "use crate::settings::PipelineSettings; fn size(s: &PipelineSettings) -> usize { s.max_concurrent_generations() }",
    false
)]
#[case::outbound_uses_clap(
    "outbound/provider/http_provider.rs",
    "use clap::Parser; #[derive(Parser)] struct Args;",
    false
)]
fn detects_boundary_violations(
    lint_single: LintSingle,
    #[case] file: &str,
    #[case] contents: &str,
    #[case] ok: bool,
) {
    let result = lint_single.lint(file, contents);
    assert_eq!(result.is_ok(), ok, "result: {result:?}");
}

#[rstest]
fn files_outside_known_layers_are_rejected(lint_single: LintSingle) {
    let result = lint_single.lint("settings.rs", "pub struct PipelineSettings;");
    assert!(matches!(result, Err(ArchitectureLintError::Parse { .. })));
}

#[rstest]
fn each_offending_crate_is_reported_once_per_file(lint_single: LintSingle) {
    let result = lint_single.lint(
        "domain/account.rs",
        "use diesel::prelude::*; use diesel::sql_types::BigInt; fn a() { let _ = reqwest::Client::new(); }",
    );
    let Err(ArchitectureLintError::Violations(violations)) = result else {
        panic!("expected violations, got {result:?}");
    };
    assert_eq!(violations.len(), 2, "violations: {violations:?}");
}
