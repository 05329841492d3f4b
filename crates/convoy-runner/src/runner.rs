//! Core runner trait and the serial and threaded strategies.

use crate::task::{Task, TaskArgs};
use async_trait::async_trait;
use convoy_core::{Error, Outcome, Result, TaskFailure};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default number of jobs allowed to run at once across a build.
pub const DEFAULT_MAX_WORKERS: usize = 25;

/// Executes a list of tasks under a concurrency and failure policy.
///
/// Returns `Outcome::Failed` when one or more tasks ended unsuccessful, and
/// `Err` only for faults.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_all(&self, tasks: &mut Vec<Task>) -> Result<Outcome>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Runs tasks in order and stops at the first unsuccessful one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialRunner;

#[async_trait]
impl TaskRunner for SerialRunner {
    async fn run_all(&self, tasks: &mut Vec<Task>) -> Result<Outcome> {
        for task in tasks.iter_mut() {
            task.execute(TaskArgs::default()).await?;
            if !task.successful() {
                let kind = task.kind();
                error!("failure detected, skipping further {}s", kind.label());
                return Ok(Outcome::Failed(TaskFailure::subtasks(
                    kind,
                    vec![task.name().to_string()],
                )));
            }
        }
        Ok(Outcome::empty())
    }

    fn name(&self) -> &'static str {
        "serial"
    }
}

/// Bounded pool of worker slots shared by every stage of a build.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently held by a running task.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("worker pool closed unexpectedly".to_string()))
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

/// Runs every task concurrently on a [`WorkerPool`].
///
/// No fail-fast: all tasks run to completion before the aggregate outcome is
/// decided. Task order is preserved in the list afterwards.
#[derive(Debug, Clone)]
pub struct ThreadedRunner {
    pool: WorkerPool,
}

impl ThreadedRunner {
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

async fn execute_with_permit(pool: &WorkerPool, task: &mut Task) -> Result<()> {
    let _permit = pool.acquire().await?;
    task.execute(TaskArgs::default()).await
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[async_trait]
impl TaskRunner for ThreadedRunner {
    async fn run_all(&self, tasks: &mut Vec<Task>) -> Result<Outcome> {
        let pending = std::mem::take(tasks);
        let total = pending.len();
        info!(tasks = total, "running with {} workers", self.pool.size());

        let mut join_set = JoinSet::new();
        for (idx, mut task) in pending.into_iter().enumerate() {
            let pool = self.pool.clone();
            debug!("Queueing {} ({})", task.name(), task.id());
            join_set.spawn(async move {
                let caught = AssertUnwindSafe(execute_with_permit(&pool, &mut task))
                    .catch_unwind()
                    .await;
                let result = match caught {
                    Ok(result) => result,
                    Err(panic) => {
                        task.mark_aborted();
                        Err(Error::Internal(format!(
                            "{} [{}] panicked: {}",
                            task.kind().label(),
                            task.name(),
                            panic_message(panic.as_ref())
                        )))
                    }
                };
                (idx, task, result)
            });
        }

        let mut slots: Vec<Option<Task>> = (0..total).map(|_| None).collect();
        let mut fault: Option<Error> = None;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, task, result)) => {
                    debug!(task = %task.name(), successful = task.successful(), "worker finished");
                    if let Err(e) = result {
                        if fault.is_none() {
                            fault = Some(e);
                        } else {
                            warn!(error = %e, task = %task.name(), "additional fault in stage");
                        }
                    }
                    slots[idx] = Some(task);
                }
                Err(e) => {
                    error!(error = %e, "worker terminated abnormally");
                    if fault.is_none() {
                        fault = Some(Error::Internal(format!("task worker failed: {}", e)));
                    }
                }
            }
        }

        tasks.extend(slots.into_iter().flatten());

        if let Some(e) = fault {
            return Err(e);
        }

        let failed: Vec<&Task> = tasks.iter().filter(|t| !t.successful()).collect();
        match failed.first() {
            Some(first) => {
                let kind = first.kind();
                error!(failed = failed.len(), "{} of {} {}s failed", failed.len(), total, kind.label());
                Ok(Outcome::Failed(TaskFailure::subtasks(
                    kind,
                    failed.iter().map(|t| t.name().to_string()).collect(),
                )))
            }
            None => Ok(Outcome::empty()),
        }
    }

    fn name(&self) -> &'static str {
        "threaded"
    }
}
