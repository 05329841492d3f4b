//! Containerized-serial execution: one container per job.

use crate::runner::TaskRunner;
use crate::task::{CommandPhase, Task, TaskArgs};
use async_trait::async_trait;
use convoy_core::ports::{ContainerHandle, ContainerRuntime};
use convoy_core::{Outcome, Result, TaskFailure, TaskKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happens to a job's container once its commands finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Teardown {
    /// Force-remove the container and its volumes.
    #[default]
    Remove,
    /// Stop the container and leave it for inspection.
    Stop,
}

/// A live container handed to each command of a job.
#[derive(Clone)]
pub struct ContainerScope {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
}

impl ContainerScope {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, handle: ContainerHandle) -> Self {
        Self { runtime, handle }
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }
}

impl fmt::Debug for ContainerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerScope")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Runs a job's commands serially inside a single container.
///
/// Main commands stop at the first failure. `after_failure` commands run only
/// if a main command failed, `finally` commands always run; neither changes the
/// job's outcome. The container is torn down on every exit path.
pub struct ContainerRunner {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
    env: BTreeMap<String, String>,
    teardown: Teardown,
}

impl ContainerRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: impl Into<String>) -> Self {
        Self {
            runtime,
            image: image.into(),
            env: BTreeMap::new(),
            teardown: Teardown::default(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_teardown(mut self, teardown: Teardown) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    async fn run_commands(&self, scope: &ContainerScope, tasks: &mut [Task]) -> Result<Outcome> {
        let main = run_phase(scope, tasks, CommandPhase::Main).await;

        let hooks = match &main {
            Ok(Some(_)) => run_phase(scope, tasks, CommandPhase::AfterFailure)
                .await
                .map(|hook| {
                    if let Some(hook) = hook {
                        warn!(failure = %hook, "after_failure commands did not complete");
                    }
                }),
            _ => Ok(()),
        };

        // finally commands run even after a fault; the first fault wins.
        let finally = run_phase(scope, tasks, CommandPhase::Finally).await;
        match &finally {
            Ok(Some(hook)) => warn!(failure = %hook, "finally commands did not complete"),
            Err(e) if main.is_err() || hooks.is_err() => {
                warn!(error = %e, "finally commands aborted")
            }
            _ => {}
        }

        let failure = main?;
        hooks?;
        finally?;

        Ok(match failure {
            Some(failure) => Outcome::Failed(failure),
            None => Outcome::empty(),
        })
    }
}

impl fmt::Debug for ContainerRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerRunner")
            .field("image", &self.image)
            .field("env", &self.env)
            .field("teardown", &self.teardown)
            .finish_non_exhaustive()
    }
}

fn phase_of(task: &Task) -> CommandPhase {
    task.phase().unwrap_or(CommandPhase::Main)
}

async fn run_phase(
    scope: &ContainerScope,
    tasks: &mut [Task],
    phase: CommandPhase,
) -> Result<Option<TaskFailure>> {
    for task in tasks.iter_mut().filter(|t| phase_of(t) == phase) {
        info!(
            "starting task [{}] in {}",
            task.name(),
            scope.handle().short_id()
        );
        task.execute(TaskArgs::in_container(scope.clone())).await?;
        if !task.successful() {
            error!("failure detected, skipping further {}s", task.kind().label());
            return Ok(Some(TaskFailure::subtasks(
                TaskKind::Command,
                vec![task.name().to_string()],
            )));
        }
    }
    Ok(None)
}

async fn tear_down(
    runtime: &dyn ContainerRuntime,
    handle: &ContainerHandle,
    teardown: Teardown,
) -> Result<()> {
    match teardown {
        Teardown::Remove => {
            debug!(container = %handle, "removing container");
            runtime.remove(handle).await
        }
        Teardown::Stop => {
            debug!(container = %handle, "stopping container");
            runtime.stop(handle).await
        }
    }
}

/// Owns a started container until it is explicitly released.
///
/// Dropping an unreleased guard (cancellation or a panic mid-job) schedules the
/// teardown on the current tokio runtime.
struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
    teardown: Teardown,
    released: bool,
}

impl ContainerGuard {
    async fn release(mut self) {
        self.released = true;
        if let Err(e) = tear_down(self.runtime.as_ref(), &self.handle, self.teardown).await {
            warn!(container = %self.handle, error = %e, "Failed to tear down container");
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let runtime = Arc::clone(&self.runtime);
        let handle = self.handle.clone();
        let teardown = self.teardown;
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                warn!(container = %handle, "container dropped before release, scheduling teardown");
                rt.spawn(async move {
                    if let Err(e) = tear_down(runtime.as_ref(), &handle, teardown).await {
                        warn!(container = %handle, error = %e, "Failed to tear down container");
                    }
                });
            }
            Err(_) => {
                warn!(container = %handle, "no runtime left to tear down container");
            }
        }
    }
}

#[async_trait]
impl TaskRunner for ContainerRunner {
    async fn run_all(&self, tasks: &mut Vec<Task>) -> Result<Outcome> {
        let handle = self.runtime.create_and_start(&self.image, &self.env).await?;
        info!(image = %self.image, "Using Container {}", handle.short_id());

        let guard = ContainerGuard {
            runtime: Arc::clone(&self.runtime),
            handle: handle.clone(),
            teardown: self.teardown,
            released: false,
        };
        let scope = ContainerScope::new(Arc::clone(&self.runtime), handle);

        let result = self.run_commands(&scope, tasks).await;
        guard.release().await;
        result
    }

    fn name(&self) -> &'static str {
        "container"
    }
}
