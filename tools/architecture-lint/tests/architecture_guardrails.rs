//! Behaviour tests for the architecture guardrails over an on-disk tree.

use std::fs;
use std::path::PathBuf;

use architecture_lint::{
    ArchitectureLintError, LintReport, LintSource, Violation, lint_workspace,
    locate_workspace_root,
};
use rstest::{fixture, rstest};
use tempfile::TempDir;

fn source(file: &str, contents: &str) -> LintSource {
    LintSource {
        file: PathBuf::from(file),
        contents: contents.to_owned(),
    }
}

#[fixture]
fn valid_modules() -> Vec<LintSource> {
    vec![
        source(
            "domain/account.rs",
            "pub struct AccountId(i64); impl AccountId { pub const fn new(raw: i64) -> Self { Self(raw) } }",
        ),
        source(
            "domain/ports/ledger_store.rs",
            "use crate::domain::account::AccountId; pub trait LedgerStore { fn find(&self, id: AccountId); }",
        ),
        source(
            "outbound/persistence/diesel_ledger_store.rs",
            "use crate::domain::ports::LedgerStore; use diesel_async::AsyncPgConnection; pub struct Store;",
        ),
        // Files outside the layered modules are not collected.
        source(
            "settings.rs",
            "use ortho_config::OrthoConfig; pub struct PipelineSettings;",
        ),
    ]
}

/// Lay the sources out as `<workspace>/backend/src/...` under a fresh temp dir.
fn workspace_with(sources: &[LintSource]) -> TempDir {
    let temp_dir = TempDir::new().expect("tempdir");
    fs::write(
        temp_dir.path().join("Cargo.toml"),
        "[workspace]\nmembers = [\"backend\"]\n",
    )
    .expect("write workspace manifest");
    let src_dir = temp_dir.path().join("backend").join("src");
    for source in sources {
        let path = src_dir.join(&source.file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directories");
        }
        fs::write(&path, &source.contents).expect("write source file");
    }
    temp_dir
}

fn lint_tree(sources: &[LintSource]) -> Result<LintReport, ArchitectureLintError> {
    let workspace = workspace_with(sources);
    architecture_lint::lint_backend_sources(&workspace.path().join("backend"))
}

fn violations(outcome: Result<LintReport, ArchitectureLintError>) -> Vec<Violation> {
    match outcome {
        Ok(report) => panic!("expected violations, lint succeeded: {report:?}"),
        Err(ArchitectureLintError::Violations(violations)) => violations,
        Err(other) => panic!("expected violations error, got: {other:?}"),
    }
}

fn assert_violation(violations: &[Violation], file: &str, substring: &str) {
    let file = PathBuf::from(file);
    assert!(
        violations
            .iter()
            .any(|violation| violation.file == file && violation.message.contains(substring)),
        "expected violation in '{file:?}' containing '{substring}', got: {violations:?}"
    );
}

#[rstest]
fn clean_tree_reports_backend_and_layer_file_count(valid_modules: Vec<LintSource>) {
    let workspace = workspace_with(&valid_modules);

    let report = lint_workspace(workspace.path()).expect("clean tree passes");

    assert_eq!(report.backend_dir, workspace.path().join("backend"));
    // settings.rs sits outside both layers.
    assert_eq!(report.files_checked, 3);
}

#[rstest]
fn workspace_root_is_found_from_a_nested_directory(valid_modules: Vec<LintSource>) {
    let workspace = workspace_with(&valid_modules);
    let nested = workspace.path().join("backend").join("src").join("domain");

    let root = locate_workspace_root([nested]).expect("root found");

    assert_eq!(root, workspace.path());
}

#[rstest]
fn later_starts_are_tried_when_earlier_ones_have_no_workspace(valid_modules: Vec<LintSource>) {
    let outside = TempDir::new().expect("tempdir");
    let workspace = workspace_with(&valid_modules);

    let root = locate_workspace_root([outside.path().to_path_buf(), workspace.path().to_path_buf()])
        .expect("second start resolves");

    assert_eq!(root, workspace.path());
}

#[rstest]
fn member_manifests_are_not_mistaken_for_the_workspace() {
    let temp_dir = TempDir::new().expect("tempdir");
    let member = temp_dir.path().join("backend");
    fs::create_dir_all(&member).expect("member dir");
    fs::write(
        member.join("Cargo.toml"),
        "[package]\nname = \"backend\"\n\n[workspace.lints]\n",
    )
    .expect("write member manifest");

    let outcome = locate_workspace_root([member.clone()]);

    assert!(
        !matches!(&outcome, Ok(root) if *root == member),
        "`[workspace.lints]` is not a workspace: {outcome:?}"
    );
}

#[rstest]
#[case::domain_imports_adapter(
    "domain/generation_service/mod.rs",
    "use crate::outbound::provider::HttpGenerationProvider; fn wire() {}",
    "crate::outbound"
)]
#[case::domain_imports_diesel(
    "domain/bad.rs",
    "use diesel::prelude::*; fn lock() {}",
    "external crate `diesel`"
)]
#[case::adapter_reads_settings(
    "outbound/provider/bad.rs",
    "use crate::settings::PipelineSettings; fn build() {}",
    "crate::settings"
)]
fn single_violation_is_reported(
    valid_modules: Vec<LintSource>,
    #[case] file: &str,
    #[case] contents: &str,
    #[case] expected: &str,
) {
    let mut sources = valid_modules;
    sources.push(source(file, contents));

    let found = violations(lint_tree(&sources));
    assert_eq!(found.len(), 1, "violations: {found:?}");
    assert_violation(&found, file, expected);
}

#[rstest]
fn all_violations_are_reported(valid_modules: Vec<LintSource>) {
    let mut sources = valid_modules;
    sources.push(source(
        "domain/bad.rs",
        "use reqwest::Client; fn call() { let _ = Client::new(); }",
    ));
    sources.push(source(
        "outbound/bad.rs",
        "use clap::Parser; #[derive(Parser)] struct Args;",
    ));

    let found = violations(lint_tree(&sources));
    assert_violation(&found, "domain/bad.rs", "external crate `reqwest`");
    assert_violation(&found, "outbound/bad.rs", "external crate `clap`");
}
