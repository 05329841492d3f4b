//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and external adapters.

use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

/// Stream of output lines from an exec session.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A running container created for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

impl ContainerHandle {
    /// Id shortened the way `docker ps` prints it.
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(12);
        &self.id[..end]
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.short_id())
    }
}

/// A command started inside a container.
///
/// Drain `output` to completion before asking for the exit code.
pub struct ExecSession {
    pub id: String,
    pub output: LineStream,
}

impl fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecSession").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Container runtime used to execute jobs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start an idle container from `image` with `env` set.
    async fn create_and_start(
        &self,
        image: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<ContainerHandle>;

    /// Start `command` in the container and stream its output lines.
    async fn exec_stream(&self, container: &ContainerHandle, command: &str)
    -> Result<ExecSession>;

    /// Exit code of a finished exec session.
    async fn exec_exit_code(&self, session_id: &str) -> Result<i64>;

    /// Force-remove the container and its volumes.
    async fn remove(&self, container: &ContainerHandle) -> Result<()>;

    /// Stop the container, leaving it in place.
    async fn stop(&self, container: &ContainerHandle) -> Result<()>;
}
