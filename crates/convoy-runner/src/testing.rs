//! In-memory container runtime for tests.

use async_trait::async_trait;
use convoy_core::ports::{ContainerHandle, ContainerRuntime, ExecSession};
use convoy_core::{Error, Result};
use futures::StreamExt;
use futures::stream;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub(crate) struct FakeRuntime {
    scripts: HashMap<String, (Vec<String>, i64)>,
    delay: Option<Duration>,
    fail_create: bool,
    fail_exec: Option<String>,
    fail_teardown: bool,
    next_id: AtomicUsize,
    sessions: Mutex<HashMap<String, String>>,
    events: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    created: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output and exit code for `command`. Unscripted commands print nothing and exit 0.
    pub fn script(mut self, command: &str, output: &[&str], exit_code: i64) -> Self {
        let output = output.iter().map(|l| l.to_string()).collect();
        self.scripts.insert(command.to_string(), (output, exit_code));
        self
    }

    /// Hold every exec open for `delay`.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_exec(mut self, command: &str) -> Self {
        self.fail_exec = Some(command.to_string());
        self
    }

    pub fn failing_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    /// Number of recorded calls of `kind`: create, exec, remove or stop.
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.split(':').next() == Some(kind))
            .count()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn created_with(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.created.lock().unwrap().clone()
    }

    pub fn max_concurrent_execs(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_and_start(
        &self,
        image: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<ContainerHandle> {
        if self.fail_create {
            return Err(Error::Container("cannot connect to container runtime".to_string()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(format!("create:{}", image));
        self.created
            .lock()
            .unwrap()
            .push((image.to_string(), env.clone()));
        Ok(ContainerHandle {
            id: format!("{:064x}", n + 1),
            name: format!("convoy_fake_{}", n),
        })
    }

    async fn exec_stream(&self, container: &ContainerHandle, command: &str) -> Result<ExecSession> {
        if self.fail_exec.as_deref() == Some(command) {
            return Err(Error::Container(format!("exec failed in {}", container.name)));
        }

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let id = format!("exec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.record(format!("exec:{}", command));
        self.executed.lock().unwrap().push(command.to_string());
        self.sessions
            .lock()
            .unwrap()
            .insert(id.clone(), command.to_string());

        let lines = self
            .scripts
            .get(command)
            .map(|(lines, _)| lines.clone())
            .unwrap_or_default();
        Ok(ExecSession {
            id,
            output: stream::iter(lines.into_iter().map(Ok)).boxed(),
        })
    }

    async fn exec_exit_code(&self, session_id: &str) -> Result<i64> {
        let sessions = self.sessions.lock().unwrap();
        let command = sessions
            .get(session_id)
            .ok_or_else(|| Error::Container(format!("unknown exec {}", session_id)))?;
        Ok(self.scripts.get(command).map(|(_, code)| *code).unwrap_or(0))
    }

    async fn remove(&self, container: &ContainerHandle) -> Result<()> {
        self.record(format!("remove:{}", container.id));
        if self.fail_teardown {
            return Err(Error::Container("remove failed".to_string()));
        }
        Ok(())
    }

    async fn stop(&self, container: &ContainerHandle) -> Result<()> {
        self.record(format!("stop:{}", container.id));
        if self.fail_teardown {
            return Err(Error::Container("stop failed".to_string()));
        }
        Ok(())
    }
}
