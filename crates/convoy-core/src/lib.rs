//! Convoy CI Core
//!
//! Core domain types, traits, and error handling for Convoy CI.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the runner and the command-line interface.

pub mod error;
pub mod ids;
pub mod pipeline;
pub mod ports;
pub mod task;

pub use error::{Error, Result, TaskFailure};
pub use ids::*;
pub use task::{Outcome, TaskKind, TaskState, format_runtime};
