// tests/config_loading.rs
mod common;

use std::error::Error;

use crate::common::init_tracing;

use lazydag::config::loader::{parse_input_ref, read_program};
use lazydag::config::model::{CallArg, Join, Program};
use lazydag::errors::LazydagError;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn toml_programs_parse_all_sections() -> TestResult {
    init_tracing();

    let text = r#"
include = ["extra.toml"]

[environment]
build = "out"

[[task]]
name = "all"
requires = ["${build}/done.txt"]

[template.echo]
stdout = "${file}"
script = "echo '${text}'"

[[call]]
template = "echo"
join = "outer"
collect = "echoes"
  [call.args]
  file = ["a", "b"]
  text = "hi"

[runner.node]
command = "node"
args = ["${script}"]
"#;
    let program: Program = toml::from_str(text)?;
    assert_eq!(program.environment["build"], "out");
    assert_eq!(program.task.len(), 1);
    assert_eq!(program.template.len(), 1);
    assert_eq!(program.call[0].join, Join::Outer);
    assert_eq!(program.call[0].collect.as_deref(), Some("echoes"));
    assert!(matches!(program.call[0].args["file"], CallArg::List(_)));
    assert!(matches!(program.call[0].args["text"], CallArg::Scalar(_)));
    assert_eq!(program.include, vec!["extra.toml"]);
    assert_eq!(program.runner["node"].command, "node");
    Ok(())
}

#[test]
fn json_programs_share_the_schema() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("workflow.json");
    std::fs::write(
        &path,
        r#"{
            "environment": {"msg": "hello"},
            "task": [
                {"name": "all", "script": "echo '${msg}'"}
            ]
        }"#,
    )?;

    let program = read_program(&path, None)?;
    assert_eq!(program.environment["msg"], "hello");
    assert_eq!(program.task[0].name.as_deref(), Some("all"));
    Ok(())
}

#[test]
fn section_suffix_selects_a_nested_table() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pyproject.toml");
    std::fs::write(
        &path,
        r#"
[project]
name = "unrelated"

[tool.lazydag]
[[tool.lazydag.task]]
name = "all"
script = "true"
"#,
    )?;

    let program = read_program(&path, Some("tool.lazydag"))?;
    assert_eq!(program.task[0].name.as_deref(), Some("all"));

    let reference = format!("{}[tool.lazydag]", path.display());
    let (parsed_path, section) = parse_input_ref(&reference);
    assert_eq!(parsed_path, path);
    assert_eq!(section.as_deref(), Some("tool.lazydag"));
    Ok(())
}

#[test]
fn missing_sections_are_a_helpful_error() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pyproject.toml");
    std::fs::write(&path, "[project]\nname = \"x\"\n")?;

    let err = read_program(&path, Some("tool.lazydag")).unwrap_err();
    assert!(matches!(err, LazydagError::User(_)), "{err}");
    assert!(err.to_string().contains("tool.lazydag"));
    Ok(())
}

#[test]
fn unknown_task_fields_are_rejected() {
    init_tracing();

    let text = r#"
[[task]]
name = "all"
comand = "typo"
"#;
    let err = toml::from_str::<Program>(text).unwrap_err();
    assert!(err.to_string().contains("comand"));
}

#[test]
fn unknown_file_formats_are_rejected() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("workflow.yaml");
    std::fs::write(&path, "task: []\n")?;

    let err = read_program(&path, None).unwrap_err();
    assert!(matches!(err, LazydagError::User(_)), "{err}");
    Ok(())
}
