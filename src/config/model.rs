// src/config/model.rs

//! Program data model as read from a TOML or JSON file.
//!
//! This is a direct mapping of the on-disk schema:
//!
//! ```toml
//! [environment]
//! build_dir = "build"
//!
//! [[task]]
//! creates = ["${build_dir}/out.txt"]
//! requires = ["in.txt"]
//! runner = "bash"
//! script = "sort in.txt > ${build_dir}/out.txt"
//!
//! [template.echo]
//! stdout = "${file}"
//! script = "echo '${text}'"
//!
//! [[call]]
//! template = "echo"
//! collect = "greetings"
//!   [call.args]
//!   file = ["a.txt", "b.txt"]
//!   text = ["hello", "goodbye"]
//! ```
//!
//! All sections are optional. Unknown fields are rejected so that typos
//! surface as configuration errors instead of silently ignored keys.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Deserializer};

use crate::exec::Runner;
use crate::template::Templated;

/// One program file (or one addressed subsection of it).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Program {
    /// Variables registered as lazy nodes; values may be templated.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Plain task declarations.
    #[serde(default)]
    pub task: Vec<TaskSpec>,

    /// Templates indexed by name; expanded by `call` entries.
    #[serde(default)]
    pub template: BTreeMap<String, TaskSpec>,

    /// Template invocations.
    #[serde(default)]
    pub call: Vec<TemplateCall>,

    /// Further program files to merge; each entry may be templated and may
    /// name a file generated by one of this program's tasks.
    #[serde(default)]
    pub include: Vec<String>,

    /// Runner declarations merged over the built-in table.
    #[serde(default)]
    pub runner: BTreeMap<String, Runner>,
}

/// A declared task, still at the string level: target fields may contain
/// placeholders and have not yet been parsed into typed [`Target`]s.
///
/// [`Target`]: crate::target::Target
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    #[serde(default)]
    pub creates: Vec<String>,

    #[serde(default)]
    pub requires: Vec<String>,

    /// Phony name; `#name` is an implicit member of `creates`.
    pub name: Option<String>,

    /// Key into the runner table. Without a runner, each non-empty script
    /// line is word-split and executed directly.
    pub runner: Option<String>,

    /// Path of an existing script file; mutually exclusive with `script`.
    pub path: Option<String>,

    /// Inline script text; mutually exclusive with `path`.
    pub script: Option<String>,

    /// `file` or `var(name)` piped into the child process.
    pub stdin: Option<String>,

    /// `file` or `var(name)` receiving the child's output.
    pub stdout: Option<String>,

    /// Human-readable banner shown when the task runs.
    pub description: Option<String>,

    /// Run even when all file targets are up to date.
    #[serde(default)]
    pub force: bool,
}

impl TaskSpec {
    /// All target strings: `creates` plus the implicit stdout and phony
    /// name members.
    pub fn all_targets(&self) -> Vec<String> {
        let mut targets = self.creates.clone();
        if let Some(stdout) = &self.stdout {
            if !targets.contains(stdout) {
                targets.push(stdout.clone());
            }
        }
        if let Some(name) = &self.name {
            let phony = format!("#{name}");
            if !targets.contains(&phony) {
                targets.push(phony);
            }
        }
        targets
    }

    /// All dependency strings: `requires` plus the implicit stdin and
    /// script-path members.
    pub fn all_dependencies(&self) -> Vec<String> {
        let mut deps = self.requires.clone();
        if let Some(stdin) = &self.stdin {
            if !deps.contains(stdin) {
                deps.push(stdin.clone());
            }
        }
        if let Some(path) = &self.path {
            if !deps.contains(path) {
                deps.push(path.clone());
            }
        }
        deps
    }
}

impl Templated for TaskSpec {
    fn gather(&self, out: &mut BTreeSet<String>) {
        self.creates.gather(out);
        self.requires.gather(out);
        self.name.gather(out);
        self.runner.gather(out);
        self.path.gather(out);
        self.script.gather(out);
        self.stdin.gather(out);
        self.stdout.gather(out);
        self.description.gather(out);
    }

    fn substitute(&self, env: &HashMap<String, String>) -> Self {
        TaskSpec {
            creates: self.creates.substitute(env),
            requires: self.requires.substitute(env),
            name: self.name.substitute(env),
            runner: self.runner.substitute(env),
            path: self.path.substitute(env),
            script: self.script.substitute(env),
            stdin: self.stdin.substitute(env),
            stdout: self.stdout.substitute(env),
            description: self.description.substitute(env),
            force: self.force,
        }
    }
}

/// A directive to expand a template against argument values.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateCall {
    /// Name of the template to expand.
    pub template: String,

    /// Argument values; lists multiplex the expansion.
    #[serde(default)]
    pub args: BTreeMap<String, CallArg>,

    /// If set, an extra phony task with this name aggregates every target
    /// the expansions produce.
    pub collect: Option<String>,

    /// How list-valued arguments combine.
    #[serde(default)]
    pub join: Join,
}

impl TemplateCall {
    /// The argument mappings this call expands to, in declaration order.
    ///
    /// With only scalar values there is exactly one expansion. Otherwise
    /// `inner` zips list values by position (scalars repeat; the shortest
    /// list bounds the count) and `outer` takes the Cartesian product.
    pub fn expansions(&self) -> Vec<HashMap<String, String>> {
        let scalars_only = self
            .args
            .values()
            .all(|arg| matches!(arg, CallArg::Scalar(_)));
        if scalars_only {
            let env = self
                .args
                .iter()
                .map(|(k, arg)| match arg {
                    CallArg::Scalar(v) => (k.clone(), v.clone()),
                    CallArg::List(_) => unreachable!(),
                })
                .collect();
            return vec![env];
        }

        match self.join {
            Join::Inner => {
                let count = self
                    .args
                    .values()
                    .filter_map(|arg| match arg {
                        CallArg::Scalar(_) => None,
                        CallArg::List(items) => Some(items.len()),
                    })
                    .min()
                    .unwrap_or(0);
                (0..count)
                    .map(|i| {
                        self.args
                            .iter()
                            .map(|(k, arg)| {
                                let value = match arg {
                                    CallArg::Scalar(v) => v.clone(),
                                    CallArg::List(items) => items[i].clone(),
                                };
                                (k.clone(), value)
                            })
                            .collect()
                    })
                    .collect()
            }
            Join::Outer => {
                let lengths: Vec<usize> = self
                    .args
                    .values()
                    .map(|arg| match arg {
                        CallArg::Scalar(_) => 1,
                        CallArg::List(items) => items.len(),
                    })
                    .collect();
                let total: usize = lengths.iter().product();
                let mut expansions = Vec::with_capacity(total);
                let mut odometer = vec![0usize; lengths.len()];
                for _ in 0..total {
                    let env = self
                        .args
                        .iter()
                        .zip(&odometer)
                        .map(|((k, arg), &i)| {
                            let value = match arg {
                                CallArg::Scalar(v) => v.clone(),
                                CallArg::List(items) => items[i].clone(),
                            };
                            (k.clone(), value)
                        })
                        .collect();
                    expansions.push(env);
                    for (digit, &len) in odometer.iter_mut().zip(&lengths).rev() {
                        *digit += 1;
                        if *digit < len {
                            break;
                        }
                        *digit = 0;
                    }
                }
                expansions
            }
        }
    }
}

/// A template argument: one value or a list of values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CallArg {
    Scalar(String),
    List(Vec<String>),
}

/// Multiplexing mode for list-valued call arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Join {
    /// Zip lists by position.
    #[default]
    Inner,
    /// Cartesian product over all values.
    Outer,
}

impl<'de> Deserialize<'de> for Join {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "inner" => Ok(Join::Inner),
            "outer" => Ok(Join::Outer),
            other => Err(serde::de::Error::custom(format!(
                "expected \"inner\" or \"outer\", got \"{other}\""
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: &[(&str, CallArg)], join: Join) -> TemplateCall {
        TemplateCall {
            template: "echo".to_string(),
            args: args
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            collect: None,
            join,
        }
    }

    fn scalar(v: &str) -> CallArg {
        CallArg::Scalar(v.to_string())
    }

    fn list(vs: &[&str]) -> CallArg {
        CallArg::List(vs.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn scalar_args_give_one_expansion() {
        let c = call(&[("a", scalar("1")), ("b", scalar("2"))], Join::Inner);
        let e = c.expansions();
        assert_eq!(e.len(), 1);
        assert_eq!(e[0]["a"], "1");
        assert_eq!(e[0]["b"], "2");
    }

    #[test]
    fn inner_join_zips_and_repeats_scalars() {
        let c = call(
            &[("pre", scalar("i")), ("a", list(&["x", "y", "z"])), ("b", list(&["1", "2", "3"]))],
            Join::Inner,
        );
        let e = c.expansions();
        assert_eq!(e.len(), 3);
        assert_eq!(e[1]["pre"], "i");
        assert_eq!(e[1]["a"], "y");
        assert_eq!(e[1]["b"], "2");
    }

    #[test]
    fn inner_join_stops_at_shortest_list() {
        let c = call(&[("a", list(&["x", "y", "z"])), ("b", list(&["1"]))], Join::Inner);
        assert_eq!(c.expansions().len(), 1);
    }

    #[test]
    fn outer_join_takes_the_product() {
        let c = call(
            &[("a", list(&["x", "y"])), ("b", list(&["1", "2"]))],
            Join::Outer,
        );
        let e = c.expansions();
        assert_eq!(e.len(), 4);
        let pairs: Vec<(String, String)> = e
            .iter()
            .map(|m| (m["a"].clone(), m["b"].clone()))
            .collect();
        assert!(pairs.contains(&("x".to_string(), "2".to_string())));
        assert!(pairs.contains(&("y".to_string(), "1".to_string())));
    }

    #[test]
    fn implicit_targets_join_creates() {
        let spec = TaskSpec {
            creates: vec!["out.txt".to_string()],
            name: Some("build".to_string()),
            stdout: Some("var(x)".to_string()),
            ..TaskSpec::default()
        };
        assert_eq!(spec.all_targets(), vec!["out.txt", "var(x)", "#build"]);
    }

    #[test]
    fn implicit_dependencies_join_requires() {
        let spec = TaskSpec {
            requires: vec!["in.txt".to_string()],
            stdin: Some("var(x)".to_string()),
            path: Some("scripts/run.sh".to_string()),
            ..TaskSpec::default()
        };
        assert_eq!(
            spec.all_dependencies(),
            vec!["in.txt", "var(x)", "scripts/run.sh"]
        );
    }

    #[test]
    fn join_parses_case_folded() {
        let c: TemplateCall =
            toml::from_str("template = \"t\"\njoin = \"OUTER\"").expect("parse");
        assert_eq!(c.join, Join::Outer);
    }
}
