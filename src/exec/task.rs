// src/exec/task.rs

//! Concrete task execution: freshness, script materialization, and
//! subprocess invocation.
//!
//! A [`Task`] is a fully substituted, typed rendition of a `TaskSpec`.
//! Whether it runs at all is a timestamp decision; how it runs depends on
//! the runner field:
//!
//! - **direct-exec** (no runner, inline script): every non-empty script
//!   line is split into shell words and spawned as a program directly.
//! - **runner mode**: the script is materialized to a temporary file (or
//!   `path` is used as-is), the runner's arguments have `${script}`
//!   substituted, and a single process runs.
//!
//! Subprocess exit codes are logged and carried into the goal-check
//! message, but the post-run freshness check is what decides failure.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::model::TaskSpec;
use crate::engine::{Database, EvalResult};
use crate::errors::Failure;
use crate::target::Target;
use crate::template::substitute;

/// A ready-to-run unit of work over typed targets.
#[derive(Debug, Clone)]
pub struct Task {
    pub creates: Vec<Target>,
    pub requires: Vec<Target>,
    pub name: Option<String>,
    pub runner: Option<String>,
    pub path: Option<PathBuf>,
    pub script: Option<String>,
    pub stdin: Option<Target>,
    pub stdout: Option<Target>,
    pub description: Option<String>,
    pub force: bool,
}

impl Task {
    /// Parse a substituted spec into typed targets. Phony stdin/stdout
    /// targets are rejected: there is no stream behind a name.
    pub fn from_spec(spec: &TaskSpec) -> Result<Task, Failure> {
        let stdin = spec.stdin.as_deref().map(Target::parse);
        if let Some(Target::Phony(name)) = &stdin {
            return Err(Failure::task(format!(
                "stdin target cannot be a phony name: `#{name}`"
            )));
        }
        let stdout = spec.stdout.as_deref().map(Target::parse);
        if let Some(Target::Phony(name)) = &stdout {
            return Err(Failure::task(format!(
                "stdout target cannot be a phony name: `#{name}`"
            )));
        }
        Ok(Task {
            creates: parse_targets(spec.all_targets()),
            requires: parse_targets(spec.all_dependencies()),
            name: spec.name.clone(),
            runner: spec.runner.clone(),
            path: spec.path.as_deref().map(PathBuf::from),
            script: spec.script.clone(),
            stdin,
            stdout,
            description: spec.description.clone(),
            force: spec.force,
        })
    }

    pub fn target_paths(&self) -> impl Iterator<Item = &Path> {
        self.creates.iter().filter_map(Target::as_path)
    }

    pub fn dependency_paths(&self) -> impl Iterator<Item = &Path> {
        self.requires.iter().filter_map(Target::as_path)
    }

    /// Tasks without file targets have no freshness to check; forced
    /// tasks opt out of it.
    pub fn always_run(&self) -> bool {
        self.force || self.target_paths().next().is_none()
    }

    /// Timestamp freshness: run when any target is missing or any target
    /// is older than any file dependency.
    pub fn needs_run(&self) -> bool {
        let mut target_times = Vec::new();
        for path in self.target_paths() {
            match mtime(path) {
                Some(time) => target_times.push(time),
                None => return true,
            }
        }
        for path in self.dependency_paths() {
            match mtime(path) {
                Some(dep_time) => {
                    if target_times.iter().any(|time| *time < dep_time) {
                        return true;
                    }
                }
                None => return true,
            }
        }
        false
    }

    fn banner(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        if let Some(name) = &self.name {
            return format!("#{name}");
        }
        let targets: Vec<String> = self.creates.iter().map(Target::to_string).collect();
        format!("creating {}", targets.join(", "))
    }

    /// Run the task if it is stale, forced, or target-less. Returns the
    /// trimmed captured stdout when the stdout target is a variable.
    pub async fn execute(&self, db: &Database) -> EvalResult {
        if !self.always_run() && !self.needs_run() && !db.force_run() {
            let targets: Vec<String> = self
                .target_paths()
                .map(|p| p.display().to_string())
                .collect();
            debug!("targets {} already up to date", targets.join(", "));
            return Ok(None);
        }
        if self.script.is_none() && self.path.is_none() {
            return Ok(None);
        }

        let note = self.banner();
        info!("{note}");

        let input = match &self.stdin {
            Some(Target::Variable(name)) => {
                let value = db.variable(name).ok_or_else(|| {
                    Failure::task(format!("variable `{name}` is not resolved"))
                })?;
                Some(value.into_bytes())
            }
            _ => None,
        };
        let stdin_file = match &self.stdin {
            Some(Target::File(path)) => Some(std::fs::File::open(path).map_err(|err| {
                Failure::task(format!("cannot open `{}`: {err}", path.display()))
            })?),
            _ => None,
        };
        let capture = matches!(self.stdout, Some(Target::Variable(_)));
        let stdout_file = match &self.stdout {
            Some(Target::File(path)) => Some(std::fs::File::create(path).map_err(|err| {
                Failure::task(format!(
                    "cannot open `{}` for writing: {err}",
                    path.display()
                ))
            })?),
            _ => None,
        };

        let io = ChildIo {
            input,
            stdin_file,
            capture,
            stdout_file,
        };

        let outcome = match (&self.runner, &self.script) {
            (None, Some(script)) => self.run_direct(db, script, &io, &note).await?,
            (Some(runner), _) => self.run_with_runner(db, runner, &io, &note).await?,
            // A bare `path` without a runner has nothing to interpret it.
            (None, None) => return Ok(None),
        };

        if self.target_paths().next().is_some() && self.needs_run() {
            let message = match outcome.last_code {
                Some(code) => {
                    format!("task did not achieve its goals (last exit code {code})")
                }
                None => "task did not achieve its goals".to_string(),
            };
            return Err(Failure::task(message));
        }

        if capture {
            let value = String::from_utf8_lossy(&outcome.captured).trim().to_string();
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    /// Direct-exec mode: word-split and spawn each non-empty line.
    async fn run_direct(
        &self,
        db: &Database,
        script: &str,
        io: &ChildIo,
        note: &str,
    ) -> Result<Outcome, Failure> {
        let lines: Vec<&str> = script
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.len() > 1 {
            // Each line would see the same stream; only one process may
            // own a piped variable.
            if matches!(self.stdin, Some(Target::Variable(_))) {
                return Err(Failure::task(
                    "a multi-line script cannot read a variable from stdin",
                ));
            }
            if io.capture {
                return Err(Failure::task(
                    "capturing stdout into a variable requires a one-line script",
                ));
            }
        }

        let mut outcome = Outcome::default();
        for line in lines {
            let words = shell_words::split(line)
                .map_err(|err| Failure::task(format!("cannot split `{line}`: {err}")))?;
            let Some((program, args)) = words.split_first() else {
                continue;
            };
            let mut cmd = Command::new(program);
            cmd.args(args);
            io.wire(&mut cmd)?;
            let _permit = db.throttle().await;
            let (status, captured) = communicate(cmd, io.input.as_deref(), note, program).await?;
            outcome.last_code = status.code();
            outcome.captured.extend(captured);
        }
        Ok(outcome)
    }

    /// Runner mode: materialize the script, substitute `${script}` into
    /// the runner arguments, spawn once.
    async fn run_with_runner(
        &self,
        db: &Database,
        runner_name: &str,
        io: &ChildIo,
        note: &str,
    ) -> Result<Outcome, Failure> {
        let runner = db
            .runner(runner_name)
            .ok_or_else(|| Failure::task(format!("unknown runner `{runner_name}`")))?;
        let (script_path, _guard) = self.script_path()?;
        let env = HashMap::from([(
            "script".to_string(),
            script_path.display().to_string(),
        )]);
        let args: Vec<String> = runner.args.iter().map(|arg| substitute(arg, &env)).collect();

        let mut cmd = Command::new(&runner.command);
        cmd.args(&args);
        io.wire(&mut cmd)?;
        let _permit = db.throttle().await;
        let (status, captured) =
            communicate(cmd, io.input.as_deref(), note, &runner.command).await?;
        Ok(Outcome {
            last_code: status.code(),
            captured,
        })
    }

    /// The script file to hand to a runner: `path` as declared, or the
    /// inline script written to a temp file that lives until the guard
    /// drops.
    fn script_path(&self) -> Result<(PathBuf, Option<NamedTempFile>), Failure> {
        if let Some(path) = &self.path {
            return Ok((path.clone(), None));
        }
        if let Some(script) = &self.script {
            let mut file = NamedTempFile::new()
                .map_err(|err| Failure::task(format!("cannot create temporary script: {err}")))?;
            file.write_all(script.as_bytes())
                .and_then(|_| file.flush())
                .map_err(|err| Failure::task(format!("cannot write temporary script: {err}")))?;
            let path = file.path().to_path_buf();
            return Ok((path, Some(file)));
        }
        Err(Failure::task(
            "a task needs either `path` or `script` to run",
        ))
    }
}

fn parse_targets(strings: Vec<String>) -> Vec<Target> {
    let mut targets = Vec::with_capacity(strings.len());
    for s in strings {
        let target = Target::parse(&s);
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Stream wiring shared by every spawn of one task.
struct ChildIo {
    /// Bytes piped into the child when stdin is a variable.
    input: Option<Vec<u8>>,
    /// Open handle when stdin is a file; cloned per spawn so sequential
    /// lines consume it like one stream.
    stdin_file: Option<std::fs::File>,
    /// Capture stdout (stdout target is a variable).
    capture: bool,
    /// Open handle when stdout is a file.
    stdout_file: Option<std::fs::File>,
}

impl ChildIo {
    fn wire(&self, cmd: &mut Command) -> Result<(), Failure> {
        if self.input.is_some() {
            cmd.stdin(Stdio::piped());
        } else if let Some(file) = &self.stdin_file {
            let handle = file
                .try_clone()
                .map_err(|err| Failure::task(format!("cannot share stdin handle: {err}")))?;
            cmd.stdin(Stdio::from(handle));
        } else {
            cmd.stdin(Stdio::null());
        }

        if self.capture {
            cmd.stdout(Stdio::piped());
        } else if let Some(file) = &self.stdout_file {
            let handle = file
                .try_clone()
                .map_err(|err| Failure::task(format!("cannot share stdout handle: {err}")))?;
            cmd.stdout(Stdio::from(handle));
        } else {
            cmd.stdout(Stdio::inherit());
        }

        cmd.stderr(Stdio::piped()).kill_on_drop(true);
        Ok(())
    }
}

#[derive(Default)]
struct Outcome {
    last_code: Option<i32>,
    captured: Vec<u8>,
}

/// Spawn the command, feed stdin, drain stdout/stderr, and wait — all
/// concurrently, so neither side can fill a pipe and stall the child.
async fn communicate(
    mut cmd: Command,
    input: Option<&[u8]>,
    note: &str,
    program: &str,
) -> Result<(std::process::ExitStatus, Vec<u8>), Failure> {
    let mut child = cmd
        .spawn()
        .map_err(|err| Failure::task(format!("failed to spawn `{program}`: {err}")))?;

    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let feed = async {
        if let (Some(mut stdin), Some(data)) = (stdin_pipe, input) {
            if let Err(err) = stdin.write_all(data).await {
                debug!(program, "stdin closed early: {err}");
            }
            // Dropping the handle closes the pipe.
        }
    };
    let drain_stdout = async {
        let mut buffer = Vec::new();
        if let Some(mut stdout) = stdout_pipe {
            let _ = stdout.read_to_end(&mut buffer).await;
        }
        buffer
    };
    let drain_stderr = async {
        if let Some(stderr) = stderr_pipe {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(task = %note, "stderr: {}", line);
            }
        }
    };

    let ((), captured, (), status) =
        tokio::join!(feed, drain_stdout, drain_stderr, child.wait());
    let status =
        status.map_err(|err| Failure::task(format!("failed to wait for `{program}`: {err}")))?;
    debug!(
        program,
        exit_code = status.code().unwrap_or(-1),
        "subprocess exited"
    );
    Ok((status, captured))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(creates: &[&str], requires: &[&str]) -> TaskSpec {
        TaskSpec {
            creates: creates.iter().map(|s| s.to_string()).collect(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            ..TaskSpec::default()
        }
    }

    #[test]
    fn phony_stdout_is_rejected() {
        let mut s = spec(&[], &[]);
        s.stdout = Some("#oops".to_string());
        let err = Task::from_spec(&s).unwrap_err();
        assert!(matches!(err, Failure::Task(_)));
    }

    #[test]
    fn stdin_and_path_become_dependencies() {
        let mut s = spec(&[], &["in.txt"]);
        s.stdin = Some("var(x)".to_string());
        s.path = Some("run.sh".to_string());
        let task = Task::from_spec(&s).expect("valid spec");
        assert!(task.requires.contains(&Target::file("in.txt")));
        assert!(task.requires.contains(&Target::variable("x")));
        assert!(task.requires.contains(&Target::file("run.sh")));
    }

    #[test]
    fn tasks_without_file_targets_always_run() {
        let mut s = spec(&[], &[]);
        s.name = Some("greet".to_string());
        let task = Task::from_spec(&s).expect("valid spec");
        assert!(task.always_run());

        let task = Task::from_spec(&spec(&["out.txt"], &[])).expect("valid spec");
        assert!(!task.always_run());
    }

    #[test]
    fn banner_prefers_description_then_name() {
        let mut s = spec(&["out.txt"], &[]);
        assert_eq!(
            Task::from_spec(&s).unwrap().banner(),
            "creating out.txt"
        );
        s.name = Some("build".to_string());
        assert_eq!(Task::from_spec(&s).unwrap().banner(), "#build");
        s.description = Some("building the thing".to_string());
        assert_eq!(Task::from_spec(&s).unwrap().banner(), "building the thing");
    }

    #[test]
    fn missing_targets_need_a_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("out.txt");
        let s = spec(&[target.to_str().unwrap()], &[]);
        let task = Task::from_spec(&s).expect("valid spec");
        assert!(task.needs_run());

        std::fs::write(&target, "done").expect("write");
        assert!(!task.needs_run());
    }
}
