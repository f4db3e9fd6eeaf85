// src/config/mod.rs

//! Program files: schema model and loading.

pub mod loader;
pub mod model;

pub use model::{CallArg, Join, Program, TaskSpec, TemplateCall};
