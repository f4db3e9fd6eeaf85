// src/config/loader.rs

//! Reading program files.
//!
//! Programs live in TOML or JSON files sharing one logical schema. A file
//! reference may carry a `[a.b.c]` suffix selecting a nested table as the
//! program root, e.g. `pyproject.toml[tool.lazydag]`.
//!
//! Default discovery, used when no `--input-file` is given:
//! 1. `lazydag.toml` in the current directory
//! 2. the `[tool.lazydag]` table inside `pyproject.toml`

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::Program;
use crate::errors::{LazydagError, Result};

/// Split an input reference like `build.toml[a.b.c]` into path and section.
pub fn parse_input_ref(reference: &str) -> (PathBuf, Option<String>) {
    if let Some(rest) = reference.strip_suffix(']') {
        if let Some(pos) = rest.rfind('[') {
            let (path, section) = rest.split_at(pos);
            return (PathBuf::from(path), Some(section[1..].to_string()));
        }
    }
    (PathBuf::from(reference), None)
}

/// Read a program from `path`, optionally descending into `section`
/// (periods indicate deeper nesting). The format follows the extension.
pub fn read_program(path: &Path, section: Option<&str>) -> Result<Program> {
    if !path.exists() {
        return Err(LazydagError::User(format!(
            "file not found: {}",
            path.display()
        )));
    }
    let contents = fs::read_to_string(path)?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let mut value: toml::Value = toml::from_str(&contents)?;
            if let Some(section) = section {
                value = descend_toml(value, section, path)?;
            }
            Ok(value.try_into()?)
        }
        Some("json") => {
            let mut value: serde_json::Value = serde_json::from_str(&contents)?;
            if let Some(section) = section {
                value = descend_json(value, section, path)?;
            }
            Ok(serde_json::from_value(value)?)
        }
        _ => Err(LazydagError::User(format!(
            "unrecognized file format: {}",
            path.display()
        ))),
    }
}

fn descend_toml(mut value: toml::Value, section: &str, path: &Path) -> Result<toml::Value> {
    for part in section.split('.') {
        value = value
            .get(part)
            .cloned()
            .ok_or_else(|| missing_section(path, section))?;
    }
    Ok(value)
}

fn descend_json(
    mut value: serde_json::Value,
    section: &str,
    path: &Path,
) -> Result<serde_json::Value> {
    for part in section.split('.') {
        value = value
            .get(part)
            .cloned()
            .ok_or_else(|| missing_section(path, section))?;
    }
    Ok(value)
}

fn missing_section(path: &Path, section: &str) -> LazydagError {
    LazydagError::User(format!(
        "data file `{}` should contain section `{}`",
        path.display(),
        section
    ))
}

/// Locate and read the program for this invocation.
pub fn discover_program(input: Option<&str>) -> Result<Program> {
    if let Some(reference) = input {
        let (path, section) = parse_input_ref(reference);
        return read_program(&path, section.as_deref());
    }

    let default = Path::new("lazydag.toml");
    if default.exists() {
        return read_program(default, None);
    }

    let pyproject = Path::new("pyproject.toml");
    if pyproject.exists() {
        return read_program(pyproject, Some("tool.lazydag")).map_err(|err| match err {
            LazydagError::User(_) => LazydagError::User(
                "without `--input-file`, lazydag looks for `lazydag.toml` first, then for \
                 a `[tool.lazydag]` section in `pyproject.toml`; a `pyproject.toml` was \
                 found, but contained no `[tool.lazydag]` section"
                    .to_string(),
            ),
            other => other,
        });
    }

    Err(LazydagError::User(
        "no input file given and no `lazydag.toml` or `pyproject.toml` found".to_string(),
    ))
}
