// src/errors.rs

//! Crate-wide error types.
//!
//! Two layers exist on purpose:
//!
//! - [`LazydagError`] covers everything that can go wrong before and around
//!   evaluation: reading programs, resolving templates and includes, user
//!   mistakes. It wraps io/toml/json errors and is not `Clone`.
//! - [`Failure`] is the evaluation-time failure a node memoizes. Concurrent
//!   requestors of the same node all receive the same memoized result, so
//!   this type is `Clone` and carries only owned data.

use std::path::PathBuf;

use thiserror::Error;

use crate::target::Target;

#[derive(Debug, Error)]
pub enum LazydagError {
    /// Input data did not match the declared program schema.
    #[error("configuration error: expected {expected}, got {got}")]
    Config { expected: String, got: String },

    /// An `include` entry resolved to a file that does not exist and is not
    /// produced by any task.
    #[error("include `{}` not found", .0.display())]
    MissingInclude(PathBuf),

    /// A `call` referenced a template that no processed file declares.
    #[error("template `{0}` not found")]
    MissingTemplate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// An evaluation failure surfaced outside of `Database::run`, e.g. while
    /// resolving variables for an include path.
    #[error(transparent)]
    Failure(#[from] Failure),

    /// Catch-all with a human-readable message.
    #[error("{0}")]
    User(String),
}

pub type Result<T> = std::result::Result<T, LazydagError>;

/// Failure of a single node evaluation.
///
/// Failures travel through the same channel as successes and are memoized
/// like them; a node with a failed dependency never runs and reports a
/// [`Failure::Dependency`] aggregating its failed inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// No node claims this target and no file with that path exists.
    #[error("missing dependency: {0}")]
    Missing(Target),

    /// The task ran (or could not run) and did not reach its goals.
    #[error("{0}")]
    Task(String),

    /// One or more dependencies failed, so this node was never run.
    #[error("{}", format_children(.0))]
    Dependency(Vec<(Target, Failure)>),

    /// The dependency chain re-entered an in-flight target.
    #[error("cycle detected: {}", format_chain(.0))]
    Cycle(Vec<Target>),
}

impl Failure {
    pub fn task(msg: impl Into<String>) -> Self {
        Failure::Task(msg.into())
    }
}

fn format_children(children: &[(Target, Failure)]) -> String {
    children
        .iter()
        .map(|(target, failure)| format!("{target} -> {failure}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_chain(chain: &[Target]) -> String {
    chain
        .iter()
        .map(Target::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
