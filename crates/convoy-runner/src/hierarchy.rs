//! Builds the Build > Stage > Job > Command tree from a pipeline definition.

use crate::container::{ContainerRunner, Teardown};
use crate::runner::WorkerPool;
use crate::task::{CommandPhase, Task};
use convoy_core::pipeline::{JobVariant, PipelineDefinition, StageDefinition};
use convoy_core::ports::ContainerRuntime;
use convoy_core::{Result, build_name};
use std::sync::Arc;
use tracing::debug;

/// Turns pipeline definitions into executable task trees.
///
/// Every stage of a built tree shares one [`WorkerPool`], so the pool size caps
/// running jobs across the whole build.
#[derive(Clone)]
pub struct TaskFactory {
    runtime: Arc<dyn ContainerRuntime>,
    pool: WorkerPool,
    teardown: Teardown,
}

impl TaskFactory {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            pool: WorkerPool::default(),
            teardown: Teardown::default(),
        }
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_teardown(mut self, teardown: Teardown) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Parse, validate and build in one step.
    pub fn from_yaml_str(&self, content: &str) -> Result<Task> {
        self.build(&PipelineDefinition::from_yaml_str(content)?)
    }

    pub fn from_value(&self, document: serde_yaml::Value) -> Result<Task> {
        self.build(&PipelineDefinition::from_value(document)?)
    }

    /// Build the root task. Nothing runs until `execute()` is called on it.
    pub fn build(&self, pipeline: &PipelineDefinition) -> Result<Task> {
        let stages = pipeline
            .stages
            .iter()
            .map(|stage| self.stage(stage))
            .collect::<Result<Vec<_>>>()?;

        let build = Task::build(build_name(), stages)?;
        debug!(build = %build.name(), nodes = build.walk().len(), "task tree built");
        Ok(build)
    }

    fn stage(&self, stage: &StageDefinition) -> Result<Task> {
        let jobs = stage
            .jobs
            .iter()
            .flat_map(|job| job.split())
            .map(|variant| self.job(variant))
            .collect::<Result<Vec<_>>>()?;

        Task::stage(&stage.name, jobs, self.pool.clone())
    }

    fn job(&self, variant: JobVariant) -> Result<Task> {
        let phases = [
            (CommandPhase::Main, variant.commands),
            (CommandPhase::AfterFailure, variant.after_failure),
            (CommandPhase::Finally, variant.finally),
        ];

        let mut commands = Vec::new();
        for (phase, list) in phases {
            for command in list {
                commands.push(Task::hook(command, phase)?);
            }
        }

        let runner = ContainerRunner::new(Arc::clone(&self.runtime), variant.image)
            .with_env(variant.env)
            .with_teardown(self.teardown);
        Task::job(variant.name, commands, runner)
    }
}
