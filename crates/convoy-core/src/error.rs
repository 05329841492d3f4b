//! Error types for Convoy CI.
//!
//! [`Error`] is the fault channel: anything that is not an ordinary task
//! failure. Expected failures travel as [`TaskFailure`] inside
//! [`crate::task::Outcome::Failed`] and never become an `Error`.

use crate::task::TaskKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Pipeline definition errors
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),

    // Container runtime errors
    #[error("Container runtime error: {0}")]
    Container(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error rejected the pipeline before anything ran.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The task-failure signal.
///
/// Returned by work functions and runners when a task did not succeed. A
/// parent's `execute()` records it as node state instead of propagating it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskFailure {
    #[error("command [{command}] returned exitcode [{exit_code}]")]
    CommandFailed {
        command: String,
        exit_code: i64,
        output: Vec<String>,
    },

    #[error("{} {}(s) failed: {}", failed.len(), kind.label(), failed.join(", "))]
    SubtasksFailed { kind: TaskKind, failed: Vec<String> },
}

impl TaskFailure {
    /// Failure raised by a runner on behalf of the children named in `failed`.
    pub fn subtasks(kind: TaskKind, failed: Vec<String>) -> Self {
        TaskFailure::SubtasksFailed { kind, failed }
    }

    /// Exit code of the failed command, if this failure came from one.
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            TaskFailure::CommandFailed { exit_code, .. } => Some(*exit_code),
            TaskFailure::SubtasksFailed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message() {
        let failure = TaskFailure::CommandFailed {
            command: "make test".to_string(),
            exit_code: 2,
            output: vec![],
        };
        assert_eq!(failure.to_string(), "command [make test] returned exitcode [2]");
        assert_eq!(failure.exit_code(), Some(2));
    }

    #[test]
    fn test_subtasks_failed_names_kind() {
        let failure = TaskFailure::subtasks(
            TaskKind::Job,
            vec!["lint".to_string(), "unit".to_string()],
        );
        assert_eq!(failure.to_string(), "2 job(s) failed: lint, unit");
        assert_eq!(failure.exit_code(), None);
    }

    #[test]
    fn test_is_config() {
        assert!(Error::Config("missing top-level 'stages'".to_string()).is_config());
        assert!(!Error::Container("no such image".to_string()).is_config());
        assert!(!Error::Internal("worker pool closed".to_string()).is_config());
    }
}
