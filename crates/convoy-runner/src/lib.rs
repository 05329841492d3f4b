//! Task tree execution engine for Convoy CI.
//!
//! A build is a tree of [`Task`]s. Stages run one after another, jobs within a
//! stage run concurrently on a shared [`WorkerPool`], and the commands of a job
//! run serially inside one container.

pub mod command;
pub mod container;
pub mod docker;
pub mod hierarchy;
pub mod runner;
pub mod task;

#[cfg(test)]
mod testing;

pub use container::{ContainerRunner, ContainerScope, Teardown};
pub use docker::DockerRuntime;
pub use hierarchy::TaskFactory;
pub use runner::{DEFAULT_MAX_WORKERS, SerialRunner, TaskRunner, ThreadedRunner, WorkerPool};
pub use task::{CommandPhase, Task, TaskArgs, TaskReport};
