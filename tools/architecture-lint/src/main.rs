//! `cargo run -p architecture-lint`: check the backend's domain/outbound
//! layering from anywhere inside the workspace.
//!
//! The workspace root is searched from `CARGO_WORKSPACE_DIR`, then the current
//! directory, then this crate's manifest directory. On success the linted
//! backend path and file count are printed as `key=value` lines.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use architecture_lint::{ArchitectureLintError, LintReport, locate_workspace_root, lint_workspace};

fn run() -> Result<LintReport, ArchitectureLintError> {
    let starts = [
        env::var_os("CARGO_WORKSPACE_DIR").map(PathBuf::from),
        env::current_dir().ok(),
        Some(PathBuf::from(env!("CARGO_MANIFEST_DIR"))),
    ];
    let root = locate_workspace_root(starts.into_iter().flatten())?;
    lint_workspace(&root)
}

fn main() -> ExitCode {
    match run() {
        Ok(report) => {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "backend={}", report.backend_dir.display());
            let _ = writeln!(stdout, "files_checked={}", report.files_checked);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let _ = writeln!(io::stderr().lock(), "{err}");
            ExitCode::FAILURE
        }
    }
}
