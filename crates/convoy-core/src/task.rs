//! Task state vocabulary shared by the runner and reporting layers.

use crate::error::TaskFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The level a node occupies in the Build > Stage > Job > Command tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Build,
    Stage,
    Job,
    Command,
}

impl TaskKind {
    /// Lowercase label used in log lines and failure messages.
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Build => "build",
            TaskKind::Stage => "stage",
            TaskKind::Job => "job",
            TaskKind::Command => "command",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Build => "Build",
            TaskKind::Stage => "Stage",
            TaskKind::Job => "Job",
            TaskKind::Command => "Command",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a task: `Created -> Running -> {Succeeded, Failed}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Created,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Result of a work function or a runner.
///
/// Faults are carried separately as `Err(convoy_core::Error)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Work completed; carries the captured output lines.
    Succeeded(Vec<String>),
    /// Work signaled an ordinary task failure.
    Failed(TaskFailure),
}

impl Outcome {
    pub fn empty() -> Self {
        Outcome::Succeeded(Vec::new())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }
}

/// Render a runtime as `"<m> min <s.ss> sec"`, or `"N/A"` when unset.
pub fn format_runtime(runtime: Option<Duration>) -> String {
    let Some(runtime) = runtime else {
        return "N/A".to_string();
    };
    let total = runtime.as_secs_f64();
    let minutes = (total / 60.0).floor();
    let seconds = total - minutes * 60.0;
    format!("{} min {:.2} sec", minutes as u64, seconds)
}
