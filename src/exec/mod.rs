// src/exec/mod.rs

//! Subprocess execution layer: the runner table and the concrete task
//! runtime built on `tokio::process::Command`.

pub mod runner;
pub mod task;

pub use runner::{default_runners, Runner};
pub use task::Task;
