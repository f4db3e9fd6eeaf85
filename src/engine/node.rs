// src/engine/node.rs

//! Lazy nodes: the units the database evaluates.

use std::fmt;

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::config::model::TaskSpec;
use crate::engine::db::Database;
use crate::engine::EvalResult;
use crate::errors::Failure;
use crate::exec::Task;
use crate::target::Target;
use crate::template::{gather_args, substitute};

/// What a node computes when it runs.
#[derive(Debug)]
pub enum NodeKind {
    /// A declared task, kept at the string level so that placeholder
    /// fields can be substituted against the resolved environment right
    /// before execution.
    Task(TaskSpec),

    /// A variable whose value is a templated string.
    Variable { name: String, template: String },

    /// A file that exists on disk but is produced by no task. Never runs;
    /// it satisfies dependencies and contributes its mtime.
    Source,
}

/// A lazy node: declared outputs, requirements, a thunk, and a memo cell
/// guarded by a mutex. The lock and memo together guarantee at-most-one
/// evaluation per node regardless of how many dependents request it.
pub struct Node {
    creates: Vec<Target>,
    requires: Vec<Target>,
    kind: NodeKind,
    cell: Mutex<Option<EvalResult>>,
}

impl Node {
    /// A task node registered under `creates`. The placeholders in the
    /// spec become variable requirements; the concrete file/phony
    /// dependencies are awaited when the task itself runs, after
    /// substitution.
    pub fn task(spec: TaskSpec, creates: Vec<Target>) -> Node {
        let requires = gather_args(&spec)
            .into_iter()
            .map(Target::Variable)
            .collect();
        Node {
            creates,
            requires,
            kind: NodeKind::Task(spec),
            cell: Mutex::new(None),
        }
    }

    /// A variable node; its requirements are the variables referenced in
    /// the template.
    pub fn variable(name: String, template: String) -> Node {
        let requires = gather_args(&template)
            .into_iter()
            .map(Target::Variable)
            .collect();
        Node {
            creates: vec![Target::Variable(name.clone())],
            requires,
            kind: NodeKind::Variable { name, template },
            cell: Mutex::new(None),
        }
    }

    /// A no-op node for a pre-existing file.
    pub fn source(target: Target) -> Node {
        Node {
            creates: vec![target],
            requires: Vec::new(),
            kind: NodeKind::Source,
            cell: Mutex::new(None),
        }
    }

    pub fn creates(&self) -> &[Target] {
        &self.creates
    }

    pub fn requires(&self) -> &[Target] {
        &self.requires
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Evaluate once and memoize; concurrent requestors wait on the lock
    /// and then observe the memo.
    pub(crate) async fn run_cached(&self, db: &Database, visited: &[Target]) -> EvalResult {
        let mut cell = self.cell.lock().await;
        if let Some(result) = cell.as_ref() {
            return result.clone();
        }
        let result = self.evaluate(db, visited).await;
        if let Ok(Some(value)) = &result {
            for target in &self.creates {
                if let Target::Variable(name) = target {
                    db.record_variable(name, value);
                }
            }
        }
        *cell = Some(result.clone());
        result
    }

    async fn evaluate(&self, db: &Database, visited: &[Target]) -> EvalResult {
        await_dependencies(db, &self.requires, visited).await?;
        match &self.kind {
            NodeKind::Source => Ok(None),
            NodeKind::Variable { template, .. } => {
                Ok(Some(substitute(template, &db.environment())))
            }
            NodeKind::Task(spec) => {
                let concrete = substitute(spec, &db.environment());
                let task = Task::from_spec(&concrete)?;
                await_dependencies(db, &task.requires, visited).await?;
                task.execute(db).await
            }
        }
    }
}

/// Request every dependency in parallel; if any failed, collect the
/// failures keyed by target and do not run the dependent.
async fn await_dependencies(
    db: &Database,
    deps: &[Target],
    visited: &[Target],
) -> Result<(), Failure> {
    if deps.is_empty() {
        return Ok(());
    }
    let results = join_all(deps.iter().map(|dep| db.run_inner(dep.clone(), visited))).await;
    let failed: Vec<(Target, Failure)> = deps
        .iter()
        .zip(results)
        .filter_map(|(dep, result)| result.err().map(|failure| (dep.clone(), failure)))
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(Failure::Dependency(failed))
    }
}

fn join_targets(targets: &[Target]) -> String {
    targets
        .iter()
        .map(Target::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Source => {
                write!(f, "[{}] <- (existing file)", join_targets(&self.creates))
            }
            NodeKind::Variable { name, template } => {
                write!(f, "var({name}) = \"{template}\"")
            }
            NodeKind::Task(spec) => {
                if let Some(name) = &spec.name {
                    write!(f, "{name}: ")?;
                }
                write!(
                    f,
                    "[{}] <- [{}]",
                    spec.all_targets().join(", "),
                    spec.all_dependencies().join(", ")
                )?;
                if let Some(script) = &spec.script {
                    for line in script.lines() {
                        write!(f, "\n  | {line}")?;
                    }
                } else if let Some(path) = &spec.path {
                    write!(f, "\n  | <{path}>")?;
                }
                Ok(())
            }
        }
    }
}
