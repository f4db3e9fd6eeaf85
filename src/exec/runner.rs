// src/exec/runner.rs

//! Named recipes for interpreting a script via an external executable.

use std::collections::HashMap;

use serde::Deserialize;

/// An external interpreter invocation. Each element of `args` may contain
/// the `${script}` placeholder, substituted with the materialized script
/// path when the task runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Runner {
    pub command: String,
    pub args: Vec<String>,
}

impl Runner {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// The built-in runner table; program files may override entries by key.
pub fn default_runners() -> HashMap<String, Runner> {
    HashMap::from([
        (
            "bash".to_string(),
            Runner::new("bash", vec!["${script}".to_string()]),
        ),
        (
            "python".to_string(),
            Runner::new("python", vec!["${script}".to_string()]),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_bash_and_python() {
        let runners = default_runners();
        assert_eq!(runners["bash"].command, "bash");
        assert_eq!(runners["python"].args, vec!["${script}"]);
    }
}
