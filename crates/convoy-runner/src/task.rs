//! The task tree: Build > Stage > Job > Command.
//!
//! Every node is a [`Task`]. Composite nodes hand their children to a
//! [`TaskRunner`]; command nodes run their text inside the job's container.
//! [`Task::execute`] is the only state transition and is called once per node.

use crate::command;
use crate::container::{ContainerRunner, ContainerScope};
use crate::runner::{SerialRunner, TaskRunner, ThreadedRunner, WorkerPool};
use chrono::{DateTime, Utc};
use convoy_core::{
    Error, Outcome, Result, TaskFailure, TaskId, TaskKind, TaskState, format_runtime,
};
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, error, info, info_span};

/// Where a command sits within its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandPhase {
    Main,
    AfterFailure,
    Finally,
}

enum Work {
    Subtasks(Arc<dyn TaskRunner>),
    Command(CommandPhase),
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Work::Subtasks(runner) => write!(f, "Subtasks({})", runner.name()),
            Work::Command(phase) => write!(f, "Command({:?})", phase),
        }
    }
}

/// Extra arguments a runner forwards to a child's work function.
#[derive(Clone, Default)]
pub struct TaskArgs {
    pub container: Option<ContainerScope>,
}

impl TaskArgs {
    pub fn in_container(scope: ContainerScope) -> Self {
        Self {
            container: Some(scope),
        }
    }
}

/// A named, timed unit of work.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    name: String,
    kind: TaskKind,
    work: Work,
    subtasks: Vec<Task>,
    state: TaskState,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    runtime: Option<Duration>,
    results: Vec<String>,
    failure: Option<TaskFailure>,
}

impl Task {
    fn new(kind: TaskKind, name: impl Into<String>, work: Work, subtasks: Vec<Task>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Config(format!("{} tasks must have a name", kind.label())));
        }

        Ok(Self {
            id: TaskId::new(),
            name,
            kind,
            work,
            subtasks,
            state: TaskState::Created,
            start_time: None,
            end_time: None,
            runtime: None,
            results: Vec::new(),
            failure: None,
        })
    }

    /// Root of a run; stages execute one after another.
    pub fn build(name: impl Into<String>, stages: Vec<Task>) -> Result<Self> {
        Self::with_runner(TaskKind::Build, name, stages, Arc::new(SerialRunner))
    }

    /// A stage; its jobs execute concurrently on `pool`.
    pub fn stage(name: impl Into<String>, jobs: Vec<Task>, pool: WorkerPool) -> Result<Self> {
        Self::with_runner(
            TaskKind::Stage,
            name,
            jobs,
            Arc::new(ThreadedRunner::new(pool)),
        )
    }

    /// A job; its commands execute serially inside one container.
    pub fn job(name: impl Into<String>, commands: Vec<Task>, runner: ContainerRunner) -> Result<Self> {
        Self::with_runner(TaskKind::Job, name, commands, Arc::new(runner))
    }

    /// A composite node of `kind` driven by a caller-supplied runner.
    pub fn with_runner(
        kind: TaskKind,
        name: impl Into<String>,
        subtasks: Vec<Task>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Self> {
        Self::new(kind, name, Work::Subtasks(runner), subtasks)
    }

    /// A main command of a job. The name is the command text.
    pub fn command(command: impl Into<String>) -> Result<Self> {
        Self::hook(command, CommandPhase::Main)
    }

    /// A command in the given phase of a job.
    pub fn hook(command: impl Into<String>, phase: CommandPhase) -> Result<Self> {
        Self::new(TaskKind::Command, command, Work::Command(phase), Vec::new())
    }

    /// Run this node's work and record its timing and outcome.
    ///
    /// Ordinary task failures become node state and the call returns `Ok`.
    /// Faults are recorded as a failed state and then returned.
    pub fn execute(&mut self, args: TaskArgs) -> BoxFuture<'_, Result<()>> {
        let span = info_span!("task", kind = %self.kind, name = %self.name);

        Box::pin(
            async move {
                let kind = self.kind;
                self.state = TaskState::Running;
                self.start_time = Some(Utc::now());
                let started = Instant::now();
                info!("Starting {} - {}", kind, self.name);

                let outcome = match &self.work {
                    Work::Subtasks(runner) => {
                        let runner = Arc::clone(runner);
                        runner.run_all(&mut self.subtasks).await
                    }
                    Work::Command(_) => {
                        command::run_in_container(&self.name, args.container.as_ref()).await
                    }
                };

                self.end_time = Some(Utc::now());
                self.runtime = Some(started.elapsed());

                let result = match outcome {
                    Ok(Outcome::Succeeded(results)) => {
                        self.results = results;
                        self.state = TaskState::Succeeded;
                        info!("{} Ended successfully - {}", kind, self.name);
                        Ok(())
                    }
                    Ok(Outcome::Failed(failure)) => {
                        if let TaskFailure::CommandFailed { output, .. } = &failure {
                            self.results = output.clone();
                        }
                        debug!(failure = %failure, "task failure recorded");
                        error!("{} Ended with an error - {}", kind, self.name);
                        self.failure = Some(failure);
                        self.state = TaskState::Failed;
                        Ok(())
                    }
                    Err(e) => {
                        self.state = TaskState::Failed;
                        error!(error = %e, "{} aborted - {}", kind, self.name);
                        Err(e)
                    }
                };

                info!("{} Runtime - {}", kind, self.runtime_str());
                result
            }
            .instrument(span),
        )
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Phase of a command node; `None` for composite nodes.
    pub fn phase(&self) -> Option<CommandPhase> {
        match self.work {
            Work::Command(phase) => Some(phase),
            Work::Subtasks(_) => None,
        }
    }

    pub fn subtasks(&self) -> &[Task] {
        &self.subtasks
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn successful(&self) -> bool {
        self.state == TaskState::Succeeded
    }

    /// Whether `execute()` has returned for this node.
    pub fn has_run(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn runtime(&self) -> Option<Duration> {
        self.runtime
    }

    pub fn runtime_str(&self) -> String {
        format_runtime(self.runtime)
    }

    /// Captured output lines.
    pub fn results(&self) -> &[String] {
        &self.results
    }

    /// Close out a node whose `execute()` never returned, e.g. after a panic.
    pub(crate) fn mark_aborted(&mut self) {
        let now = Utc::now();
        self.state = TaskState::Failed;
        let started = *self.start_time.get_or_insert(now);
        self.end_time.get_or_insert(now);
        if self.runtime.is_none() {
            self.runtime = Some((now - started).to_std().unwrap_or_default());
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.failure.as_ref()
    }

    /// Depth-first walk over this node and all of its descendants.
    pub fn walk(&self) -> Vec<&Task> {
        let mut nodes = vec![self];
        for subtask in &self.subtasks {
            nodes.extend(subtask.walk());
        }
        nodes
    }

    /// Serializable snapshot of the tree rooted at this node.
    pub fn report(&self) -> TaskReport {
        TaskReport {
            id: self.id.to_string(),
            name: self.name.clone(),
            kind: self.kind,
            phase: self.phase(),
            state: self.state,
            successful: self.successful(),
            start_time: self.start_time,
            end_time: self.end_time,
            runtime_secs: self.runtime.map(|d| d.as_secs_f64()),
            runtime: self.runtime_str(),
            results: self.results.clone(),
            failure: self.failure.as_ref().map(ToString::to_string),
            exit_code: self.failure.as_ref().and_then(TaskFailure::exit_code),
            subtasks: self.subtasks.iter().map(Task::report).collect(),
        }
    }
}

/// Read-only view of a finished task tree.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: String,
    pub name: String,
    pub kind: TaskKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<CommandPhase>,
    pub state: TaskState,
    pub successful: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub runtime_secs: Option<f64>,
    pub runtime: String,
    pub results: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    pub subtasks: Vec<TaskReport>,
}
