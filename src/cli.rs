// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `lazydag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lazydag",
    version,
    about = "Run declared workflow goals lazily and concurrently.",
    long_about = None
)]
pub struct CliArgs {
    /// Names of the goals to run.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Program file (TOML or JSON); a `[a.b.c]` suffix selects a nested
    /// table as the program root.
    ///
    /// Default: `lazydag.toml` in the current working directory, falling
    /// back to the `[tool.lazydag]` table in `pyproject.toml`.
    #[arg(short = 'i', long, value_name = "PATH")]
    pub input_file: Option<String>,

    /// Run every task, even when its targets are up to date.
    #[arg(short = 'B', long)]
    pub force_run: bool,

    /// Limit the number of concurrently running subprocesses.
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Show the built-in runners and exit.
    #[arg(long)]
    pub list_runners: bool,

    /// Resolve the program and print the task list, but don't execute
    /// any commands.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LAZYDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
