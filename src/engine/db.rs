// src/engine/db.rs

//! The goal-addressed node database.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

use crate::engine::node::Node;
use crate::engine::EvalResult;
use crate::errors::Failure;
use crate::exec::{default_runners, Runner};
use crate::target::Target;

/// Settings fixed for the lifetime of one database.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseOptions {
    /// Run every task even when its freshness check would skip it.
    /// Memoization still applies: each task runs at most once per session.
    pub force_run: bool,

    /// Bound on concurrently live subprocesses; `None` means unbounded.
    /// Dependency traversal itself is never throttled.
    pub jobs: Option<usize>,
}

/// Maps targets to lazy nodes and coordinates their evaluation.
///
/// The index grows during program resolution (and on demand for
/// pre-existing source files) and is effectively read-only while goals
/// run. The runner table, the resolved-variable map, the throttle
/// semaphore, and the force flag all live here; there is no global state.
pub struct Database {
    index: Mutex<HashMap<Target, Arc<Node>>>,
    nodes: Mutex<Vec<Arc<Node>>>,
    runners: Mutex<HashMap<String, Runner>>,
    variables: Mutex<HashMap<String, String>>,
    throttle: Option<Semaphore>,
    force_run: bool,
}

impl Database {
    pub fn new(options: DatabaseOptions) -> Self {
        Self {
            index: Mutex::new(HashMap::new()),
            nodes: Mutex::new(Vec::new()),
            runners: Mutex::new(default_runners()),
            variables: Mutex::new(HashMap::new()),
            throttle: options.jobs.map(Semaphore::new),
            force_run: options.force_run,
        }
    }

    /// Register a node under each of its `creates` targets. A later node
    /// claiming an already-claimed target takes it over.
    pub fn insert(&self, node: Node) -> Arc<Node> {
        debug!("adding node: {node}");
        let node = Arc::new(node);
        {
            let mut index = self.index.lock().unwrap();
            for target in node.creates() {
                index.insert(target.clone(), node.clone());
            }
        }
        self.nodes.lock().unwrap().push(node.clone());
        node
    }

    pub fn get(&self, target: &Target) -> Option<Arc<Node>> {
        self.index.lock().unwrap().get(target).cloned()
    }

    pub fn contains(&self, target: &Target) -> bool {
        self.index.lock().unwrap().contains_key(target)
    }

    /// All registered nodes in insertion order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.lock().unwrap().clone()
    }

    pub fn runner(&self, name: &str) -> Option<Runner> {
        self.runners.lock().unwrap().get(name).cloned()
    }

    /// Merge program-declared runners over the table, overriding by key.
    pub fn merge_runners(&self, extra: impl IntoIterator<Item = (String, Runner)>) {
        self.runners.lock().unwrap().extend(extra);
    }

    /// Snapshot of every resolved variable, used as substitution
    /// environment. Nodes record their value here when they memoize, so a
    /// dependent that awaited `var(x)` will find `x` in this map.
    pub fn environment(&self) -> HashMap<String, String> {
        self.variables.lock().unwrap().clone()
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables.lock().unwrap().get(name).cloned()
    }

    pub(crate) fn record_variable(&self, name: &str, value: &str) {
        self.variables
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    /// Whether every named placeholder has a variable node to produce it.
    pub fn is_resolvable(&self, names: &BTreeSet<String>) -> bool {
        let index = self.index.lock().unwrap();
        names
            .iter()
            .all(|name| index.contains_key(&Target::variable(name.clone())))
    }

    pub fn force_run(&self) -> bool {
        self.force_run
    }

    /// Acquire a slot for spawning a subprocess, if throttling is on.
    pub async fn throttle(&self) -> Option<SemaphorePermit<'_>> {
        match &self.throttle {
            Some(semaphore) => semaphore.acquire().await.ok(),
            None => None,
        }
    }

    /// Evaluate the node owning `target`, memoized. Blocks until the
    /// result is available; concurrent callers share one evaluation.
    pub async fn run(&self, target: &Target) -> EvalResult {
        self.run_inner(target.clone(), &[]).await
    }

    pub(crate) fn run_inner<'a>(
        &'a self,
        target: Target,
        visited: &'a [Target],
    ) -> BoxFuture<'a, EvalResult> {
        Box::pin(async move {
            if visited.contains(&target) {
                let mut chain = visited.to_vec();
                chain.push(target);
                return Err(Failure::Cycle(chain));
            }
            let node = match self.get(&target) {
                Some(node) => node,
                None => match self.source_node(&target) {
                    Some(node) => node,
                    None => return Err(Failure::Missing(target)),
                },
            };
            let mut chain = Vec::with_capacity(visited.len() + 1);
            chain.extend_from_slice(visited);
            chain.push(target);
            node.run_cached(self, &chain).await
        })
    }

    /// An unclaimed file target that exists on disk becomes a no-op
    /// source node; anything else is missing.
    fn source_node(&self, target: &Target) -> Option<Arc<Node>> {
        let path = target.as_path()?;
        if !path.exists() {
            return None;
        }
        let mut index = self.index.lock().unwrap();
        if let Some(existing) = index.get(target) {
            return Some(existing.clone());
        }
        debug!(target = %target, "treating existing file as a source");
        let node = Arc::new(Node::source(target.clone()));
        index.insert(target.clone(), node.clone());
        drop(index);
        self.nodes.lock().unwrap().push(node.clone());
        Some(node)
    }
}
