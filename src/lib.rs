// src/lib.rs

//! lazydag — a lazy, concurrent workflow runner.
//!
//! A workflow is declared in a TOML or JSON file listing tasks, templates,
//! template calls, environment variables, runners, and includes. The
//! resolver turns the declaration into a database of lazy nodes; running a
//! goal evaluates exactly the nodes it depends on, each at most once, with
//! freshness decided by file modification times.

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod resolve;
pub mod target;
pub mod template;

use futures::future::join_all;
use tracing::{debug, error};

use crate::cli::CliArgs;
use crate::config::loader;
use crate::exec::default_runners;
use crate::resolve::resolve_program;

pub use crate::config::model::{Program, TaskSpec, TemplateCall};
pub use crate::engine::{Database, DatabaseOptions, EvalResult};
pub use crate::errors::{Failure, LazydagError, Result};
pub use crate::target::Target;

/// Outcome of a top-level invocation.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Number of requested goals that failed.
    pub failed: usize,
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - program discovery and loading
/// - the node database (force flag, job throttle)
/// - program resolution
/// - the goal fan-out and the failure report
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    if args.list_runners {
        print_runners();
        return Ok(RunSummary { failed: 0 });
    }

    let program = loader::discover_program(args.input_file.as_deref())?;
    let db = Database::new(DatabaseOptions {
        force_run: args.force_run,
        jobs: args.jobs,
    });
    resolve_program(&db, program).await?;

    for node in db.nodes() {
        debug!("{node}");
    }

    if args.dry_run {
        print_plan(&db);
        return Ok(RunSummary { failed: 0 });
    }

    // Goal strings name phony targets; a leading `#` is accepted.
    let goals: Vec<Target> = args
        .targets
        .iter()
        .map(|s| Target::phony(s.trim_start_matches('#')))
        .collect();
    let results = join_all(goals.iter().map(|goal| db.run(goal))).await;

    let failures: Vec<(&Target, Failure)> = goals
        .iter()
        .zip(results)
        .filter_map(|(goal, result)| result.err().map(|failure| (goal, failure)))
        .collect();
    if !failures.is_empty() {
        error!("some goals have failed:");
        for (goal, failure) in &failures {
            error!("{goal}:");
            for line in failure.to_string().lines() {
                error!("| {line}");
            }
        }
    }
    Ok(RunSummary {
        failed: failures.len(),
    })
}

fn print_runners() {
    let runners = default_runners();
    let mut names: Vec<&String> = runners.keys().collect();
    names.sort();
    println!("built-in runners:");
    for name in names {
        let runner = &runners[name];
        println!("  {name}: {} {}", runner.command, runner.args.join(" "));
    }
}

fn print_plan(db: &Database) {
    println!("lazydag dry-run");
    println!();
    for node in db.nodes() {
        println!("{node}");
    }
}
