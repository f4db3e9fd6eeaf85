// src/resolve.rs

//! Turning a declared [`Program`] into a populated node database.
//!
//! Resolution is recursive and single-pass per input file:
//!
//! 1. register environment variables as variable nodes
//! 2. merge declared runners over the table
//! 3. index this file's templates by name
//! 4. expand calls whose template is already known; defer the rest until
//!    includes have been processed
//! 5. insert pending tasks — unless a target string still contains
//!    placeholders, in which case the task is delayed
//! 6. a delayed-resolution pass inserts every delayed task whose target
//!    placeholders became resolvable
//! 7. process includes: resolve the (possibly templated) path, run the
//!    generating task if one claims it, then recurse into the file
//! 8. retry deferred calls against the now-richer template index
//! 9. after the whole tree is processed, a final pass flushes the delayed
//!    list; anything still unresolvable is a user error
//!
//! Delaying in step 5 decouples declaration order: a task may name its
//! targets in terms of variables defined anywhere, as long as those
//! variables do not in turn come from tasks with templated targets.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use futures::future::BoxFuture;
use tracing::debug;

use crate::config::loader;
use crate::config::model::{Program, TaskSpec, TemplateCall};
use crate::engine::{Database, Node};
use crate::errors::{LazydagError, Result};
use crate::target::Target;
use crate::template::{gather_args, substitute};

/// Resolve `program` (and everything it includes) into `db`.
pub async fn resolve_program(db: &Database, program: Program) -> Result<()> {
    let mut state = ResolveState::default();
    resolve_file(db, program, &mut state).await?;

    let delayed = std::mem::take(&mut state.delayed);
    let mut unresolved = Vec::new();
    for spec in delayed {
        if let Some(spec) = try_insert_delayed(db, spec).await? {
            unresolved.push(spec);
        }
    }
    if !unresolved.is_empty() {
        let listing: Vec<String> = unresolved
            .iter()
            .flat_map(TaskSpec::all_targets)
            .collect();
        return Err(LazydagError::User(format!(
            "tasks have unresolvable targets: {}",
            listing.join(", ")
        )));
    }
    Ok(())
}

/// Resolution state shared across included files.
#[derive(Default)]
struct ResolveState {
    templates: HashMap<String, TaskSpec>,
    delayed: Vec<TaskSpec>,
}

fn resolve_file<'a>(
    db: &'a Database,
    program: Program,
    state: &'a mut ResolveState,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for (name, template) in program.environment {
            db.insert(Node::variable(name, template));
        }
        db.merge_runners(program.runner);
        state.templates.extend(program.template);

        let mut pending = program.task;
        let mut deferred_calls = Vec::new();
        for call in program.call {
            match state.templates.get(&call.template) {
                Some(template) => pending.extend(expand_call(&call, template)),
                None => {
                    debug!(
                        template = %call.template,
                        "template not yet known; waiting for includes"
                    );
                    deferred_calls.push(call);
                }
            }
        }

        for spec in pending {
            schedule_spec(db, spec, state)?;
        }
        retry_delayed(db, state).await?;

        for include in program.include {
            let path_str = resolve_string(db, &include).await?;
            let target = Target::parse(&path_str);
            if db.contains(&target) {
                // The include is generated by a task; run it first.
                db.run(&target).await.map_err(LazydagError::Failure)?;
            }
            let path = PathBuf::from(&path_str);
            if !path.exists() {
                return Err(LazydagError::MissingInclude(path));
            }
            let nested = loader::read_program(&path, None)?;
            resolve_file(db, nested, state).await?;
        }

        for call in deferred_calls {
            let template = state
                .templates
                .get(&call.template)
                .cloned()
                .ok_or_else(|| LazydagError::MissingTemplate(call.template.clone()))?;
            for spec in expand_call(&call, &template) {
                schedule_spec(db, spec, state)?;
            }
        }
        retry_delayed(db, state).await?;

        Ok(())
    })
}

/// Expand a call into one task per argument tuple, plus the `collect`
/// aggregator when requested.
fn expand_call(call: &TemplateCall, template: &TaskSpec) -> Vec<TaskSpec> {
    let mut specs: Vec<TaskSpec> = call
        .expansions()
        .iter()
        .map(|env| substitute(template, env))
        .collect();
    if let Some(name) = &call.collect {
        let mut requires = Vec::new();
        for spec in &specs {
            for target in spec.all_targets() {
                if !requires.contains(&target) {
                    requires.push(target);
                }
            }
        }
        specs.push(TaskSpec {
            name: Some(name.clone()),
            requires,
            ..TaskSpec::default()
        });
    }
    specs
}

/// Insert a task now, or delay it when its target strings still contain
/// placeholders.
fn schedule_spec(db: &Database, spec: TaskSpec, state: &mut ResolveState) -> Result<()> {
    if target_placeholders(&spec).is_empty() {
        insert_spec(db, spec)
    } else {
        debug!(targets = ?spec.all_targets(), "delaying task with templated targets");
        state.delayed.push(spec);
        Ok(())
    }
}

fn target_placeholders(spec: &TaskSpec) -> BTreeSet<String> {
    gather_args(&spec.all_targets())
}

/// Re-attempt every delayed task; the ones whose target placeholders are
/// still not resolvable stay delayed.
async fn retry_delayed(db: &Database, state: &mut ResolveState) -> Result<()> {
    let delayed = std::mem::take(&mut state.delayed);
    for spec in delayed {
        if let Some(spec) = try_insert_delayed(db, spec).await? {
            state.delayed.push(spec);
        }
    }
    Ok(())
}

/// If every placeholder in the task's target strings has a variable node,
/// run those variables, substitute, and insert. Returns the spec when it
/// must stay deferred.
async fn try_insert_delayed(db: &Database, spec: TaskSpec) -> Result<Option<TaskSpec>> {
    let wanted = target_placeholders(&spec);
    if !db.is_resolvable(&wanted) {
        return Ok(Some(spec));
    }
    for name in &wanted {
        db.run(&Target::variable(name.clone()))
            .await
            .map_err(LazydagError::Failure)?;
    }
    let resolved = substitute(&spec, &db.environment());
    insert_spec(db, resolved)?;
    Ok(None)
}

/// Register a task node under its (now concrete) targets.
fn insert_spec(db: &Database, spec: TaskSpec) -> Result<()> {
    for stream in [&spec.stdin, &spec.stdout] {
        if let Some(value) = stream {
            if value.starts_with('#') {
                return Err(LazydagError::Config {
                    expected: "a file or variable stream target".to_string(),
                    got: format!("`{value}`"),
                });
            }
        }
    }
    let mut creates = Vec::new();
    for s in spec.all_targets() {
        let target = Target::parse(&s);
        if !creates.contains(&target) {
            creates.push(target);
        }
    }
    db.insert(Node::task(spec, creates));
    Ok(())
}

/// Resolve a templated string (e.g. an include path) by running the
/// variables it references and substituting their values.
async fn resolve_string(db: &Database, s: &str) -> Result<String> {
    let text = s.to_string();
    for name in gather_args(&text) {
        db.run(&Target::variable(name))
            .await
            .map_err(LazydagError::Failure)?;
    }
    let result = substitute(&text, &db.environment());
    if result != *s {
        debug!("substituting {s} => {result}");
    }
    Ok(result)
}
