// src/target.rs

//! Target grammar and normalization.
//!
//! Targets are the keys of the node database. The textual surface knows
//! three forms:
//!
//! - `#name` — a phony target: a named goal with no file backing.
//! - `var(name)` — a variable target: a string value produced or consumed
//!   by tasks.
//! - anything else — a file path, normalized lexically so that equivalent
//!   spellings (`./out`, `a/../out`) compare equal.

use std::fmt;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    File(PathBuf),
    Phony(String),
    Variable(String),
}

impl Target {
    /// Parse a surface string into a target.
    pub fn parse(s: &str) -> Target {
        if let Some(name) = s.strip_prefix('#') {
            return Target::Phony(name.to_string());
        }
        if let Some(name) = parse_var_ref(s) {
            return Target::Variable(name.to_string());
        }
        Target::File(normalize(Path::new(s)))
    }

    pub fn file(path: impl AsRef<Path>) -> Target {
        Target::File(normalize(path.as_ref()))
    }

    pub fn phony(name: impl Into<String>) -> Target {
        Target::Phony(name.into())
    }

    pub fn variable(name: impl Into<String>) -> Target {
        Target::Variable(name.into())
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Target::File(_))
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Target::File(path) => Some(path),
            _ => None,
        }
    }
}

/// Match `var(NAME)` where NAME contains no whitespace or parentheses.
fn parse_var_ref(s: &str) -> Option<&str> {
    let name = s.strip_prefix("var(")?.strip_suffix(')')?;
    if name.is_empty() {
        return None;
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c == '(' || c == ')')
    {
        return None;
    }
    Some(name)
}

/// Lexical path normalization: drop `.`, fold `..` into its parent where
/// possible. No filesystem access, so symlinks are not resolved; targets
/// are compared the way they were declared.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(path) => write!(f, "{}", path.display()),
            Target::Phony(name) => write!(f, "#{name}"),
            Target::Variable(name) => write!(f, "var({name})"),
        }
    }
}
