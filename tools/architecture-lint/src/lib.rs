//! Layering guard for the photoshoot backend.
//!
//! Billing rules live in `backend/src/domain` and every storage or network
//! adapter in `backend/src/outbound`. Each file under those two trees is
//! parsed with `syn`, every path it mentions is collected, and the first
//! segment is checked against the rules in [`LAYER_RULES`]:
//!
//! - `domain` may not name `outbound`, `settings` or `telemetry`, nor any
//!   crate that talks to PostgreSQL, HTTP, the CLI or process configuration.
//! - `outbound` may not name `settings` or `telemetry`, nor the CLI and
//!   configuration crates; adapters receive explicit values instead.
//!
//! Files outside the two layers (`main.rs`, `settings.rs`, `telemetry.rs`)
//! are the composition root and are not checked.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use syn::visit::Visit;
use thiserror::Error;

/// Library name of the backend crate as seen from `use` paths.
const BACKEND_CRATE: &str = "photoshoot_backend";

/// Top-level modules of the backend crate, nameable without a `crate::` prefix.
const BACKEND_MODULES: [&str; 4] = ["domain", "outbound", "settings", "telemetry"];

/// Import restrictions for one layer directory under `backend/src`.
#[derive(Debug, Clone, Copy)]
pub struct LayerRule {
    /// Directory name, also used in violation messages.
    pub layer: &'static str,
    /// Backend modules the layer must not reach.
    pub forbidden_modules: &'static [&'static str],
    /// External crates the layer must not reach.
    pub forbidden_crates: &'static [&'static str],
}

/// The rules enforced on the backend, one per checked layer.
pub static LAYER_RULES: [LayerRule; 2] = [
    LayerRule {
        layer: "domain",
        forbidden_modules: &["outbound", "settings", "telemetry"],
        forbidden_crates: &[
            "base64",
            "cap_std",
            "clap",
            "diesel",
            "diesel_async",
            "diesel_migrations",
            "ortho_config",
            "reqwest",
            "tracing_subscriber",
        ],
    },
    LayerRule {
        layer: "outbound",
        forbidden_modules: &["settings", "telemetry"],
        forbidden_crates: &["clap", "ortho_config", "tracing_subscriber"],
    },
];

impl LayerRule {
    fn for_file(file: &Path) -> Option<&'static Self> {
        let first = file.components().next()?.as_os_str().to_str()?;
        LAYER_RULES.iter().find(|rule| rule.layer == first)
    }

    fn check(&self, file: &Path, parsed: &syn::File) -> Vec<Violation> {
        let mut collector = PathCollector::default();
        collector.visit_file(parsed);

        let mut messages = BTreeSet::new();
        for segments in &collector.paths {
            match classify(segments) {
                Some(Target::Module(module)) if self.forbidden_modules.contains(&module) => {
                    messages.insert(format!(
                        "{} module must not depend on crate::{module}",
                        self.layer
                    ));
                }
                Some(Target::Crate(name)) if self.forbidden_crates.contains(&name) => {
                    messages.insert(format!(
                        "{} module must not depend on external crate `{name}`",
                        self.layer
                    ));
                }
                _ => {}
            }
        }

        messages
            .into_iter()
            .map(|message| Violation {
                file: file.to_path_buf(),
                message,
            })
            .collect()
    }
}

/// A single boundary violation discovered by the linter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File path relative to `backend/src`.
    pub file: PathBuf,
    /// Which rule was broken.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.message)
    }
}

/// Failure modes returned by the architecture lint.
#[derive(Debug, Error)]
pub enum ArchitectureLintError {
    /// No ancestor of the start directories holds a workspace manifest.
    #[error("unable to locate the workspace root (a Cargo.toml declaring [workspace])")]
    WorkspaceNotFound,
    /// Reading a directory or file failed.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// A file could not be parsed or placed in a layer.
    #[error("cannot lint {}: {message}", file.display())]
    Parse {
        /// File path relative to `backend/src`.
        file: PathBuf,
        /// Parser or layering message.
        message: String,
    },
    /// One or more boundary violations were found.
    #[error("architecture boundary violations:\n{}", list(.0))]
    Violations(Vec<Violation>),
}

fn list(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| format!("- {violation}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A Rust source file to be linted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintSource {
    /// Path relative to `backend/src`.
    pub file: PathBuf,
    /// File contents.
    pub contents: String,
}

/// Summary of a clean run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintReport {
    /// The `backend/` directory that was checked.
    pub backend_dir: PathBuf,
    /// Number of layer files parsed.
    pub files_checked: usize,
}

/// Walk up from each start directory in turn and return the first directory
/// whose `Cargo.toml` declares a `[workspace]`.
///
/// # Errors
///
/// [`ArchitectureLintError::WorkspaceNotFound`] when no start has such an
/// ancestor.
pub fn locate_workspace_root<I>(starts: I) -> Result<PathBuf, ArchitectureLintError>
where
    I: IntoIterator<Item = PathBuf>,
{
    starts
        .into_iter()
        .find_map(|start| {
            start
                .ancestors()
                .find(|dir| declares_workspace(&dir.join("Cargo.toml")))
                .map(Path::to_path_buf)
        })
        .ok_or(ArchitectureLintError::WorkspaceNotFound)
}

fn declares_workspace(manifest: &Path) -> bool {
    fs::read_to_string(manifest)
        .is_ok_and(|contents| contents.lines().any(|line| line.trim() == "[workspace]"))
}

/// Lint the `backend/` crate under `workspace_root`.
///
/// # Errors
///
/// Any [`ArchitectureLintError`]; violations are collected across all files
/// before returning.
pub fn lint_workspace(workspace_root: &Path) -> Result<LintReport, ArchitectureLintError> {
    lint_backend_sources(&workspace_root.join("backend"))
}

/// Lint the crate sources under `backend_dir/src`.
///
/// # Errors
///
/// Any [`ArchitectureLintError`].
pub fn lint_backend_sources(backend_dir: &Path) -> Result<LintReport, ArchitectureLintError> {
    let src_dir = backend_dir.join("src");
    let mut sources = Vec::new();
    for rule in &LAYER_RULES {
        let dir = src_dir.join(rule.layer);
        if dir.is_dir() {
            collect_sources(&src_dir, &dir, &mut sources)?;
        }
    }
    lint_sources(&sources)?;
    Ok(LintReport {
        backend_dir: backend_dir.to_path_buf(),
        files_checked: sources.len(),
    })
}

/// Lint in-memory sources whose paths are relative to `backend/src`.
///
/// # Errors
///
/// [`ArchitectureLintError::Parse`] for unparseable files or files outside a
/// checked layer, otherwise [`ArchitectureLintError::Violations`].
pub fn lint_sources(sources: &[LintSource]) -> Result<(), ArchitectureLintError> {
    let mut violations = Vec::new();
    for source in sources {
        let parse_error = |message: String| ArchitectureLintError::Parse {
            file: source.file.clone(),
            message,
        };
        let rule = LayerRule::for_file(&source.file)
            .ok_or_else(|| parse_error("file is not under a checked layer".to_owned()))?;
        let parsed = syn::parse_file(&source.contents).map_err(|err| parse_error(err.to_string()))?;
        violations.extend(rule.check(&source.file, &parsed));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ArchitectureLintError::Violations(violations))
    }
}

/// What the first meaningful segment of a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target<'a> {
    Module(&'a str),
    Crate(&'a str),
}

fn classify(segments: &[String]) -> Option<Target<'_>> {
    let mut rest = segments
        .iter()
        .map(String::as_str)
        .skip_while(|segment| matches!(*segment, "crate" | "self" | "super"));
    let relative = segments.first().map(String::as_str) != rest.clone().next();
    let first = rest.next()?;
    if first == BACKEND_CRATE {
        return rest.next().map(Target::Module);
    }
    if relative || BACKEND_MODULES.contains(&first) {
        return Some(Target::Module(first));
    }
    Some(Target::Crate(first))
}

#[derive(Default)]
struct PathCollector {
    paths: BTreeSet<Vec<String>>,
}

impl PathCollector {
    fn record_use_tree(&mut self, tree: &syn::UseTree, prefix: &[String]) {
        let extend = |ident: &syn::Ident| {
            let mut segments = prefix.to_vec();
            segments.push(ident.to_string());
            segments
        };
        match tree {
            syn::UseTree::Path(path) => self.record_use_tree(&path.tree, &extend(&path.ident)),
            syn::UseTree::Name(name) => {
                self.paths.insert(extend(&name.ident));
            }
            syn::UseTree::Rename(rename) => {
                self.paths.insert(extend(&rename.ident));
            }
            syn::UseTree::Glob(_) if !prefix.is_empty() => {
                self.paths.insert(prefix.to_vec());
            }
            syn::UseTree::Glob(_) => {}
            syn::UseTree::Group(group) => {
                for item in &group.items {
                    self.record_use_tree(item, prefix);
                }
            }
        }
    }
}

impl<'ast> Visit<'ast> for PathCollector {
    fn visit_path(&mut self, node: &'ast syn::Path) {
        let segments: Vec<String> = node
            .segments
            .iter()
            .map(|segment| segment.ident.to_string())
            .collect();
        if !segments.is_empty() {
            self.paths.insert(segments);
        }
        syn::visit::visit_path(self, node);
    }

    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        self.record_use_tree(&node.tree, &[]);
    }
}

fn read_error(path: &Path) -> impl FnOnce(io::Error) -> ArchitectureLintError + '_ {
    move |source| ArchitectureLintError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn collect_sources(
    src_root: &Path,
    dir: &Path,
    sources: &mut Vec<LintSource>,
) -> Result<(), ArchitectureLintError> {
    let mut entries = fs::read_dir(dir)
        .map_err(read_error(dir))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error(dir))?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_sources(src_root, &path, sources)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            let contents = fs::read_to_string(&path).map_err(read_error(&path))?;
            let file = path
                .strip_prefix(src_root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            sources.push(LintSource { file, contents });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
