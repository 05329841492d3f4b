//! Work function of a command task.

use crate::container::ContainerScope;
use convoy_core::{Error, Outcome, Result, TaskFailure};
use futures::StreamExt;
use tracing::{debug, info};

/// Run `command` in the job's container and capture its output.
///
/// A non-zero exit code is an ordinary task failure. Running a command without
/// a container is a fault.
pub async fn run_in_container(command: &str, scope: Option<&ContainerScope>) -> Result<Outcome> {
    let scope = scope.ok_or_else(|| {
        Error::Internal(format!("command [{}] executed outside of a container", command))
    })?;

    let mut output = Vec::new();
    let exit_code = exec(scope, command, |line| output.push(line.to_string())).await?;

    if exit_code != 0 {
        return Ok(Outcome::Failed(TaskFailure::CommandFailed {
            command: command.to_string(),
            exit_code,
            output,
        }));
    }

    Ok(Outcome::Succeeded(output))
}

/// Execute `command`, feeding each output line to `on_line` as it arrives.
///
/// Returns the exit code once the output stream has closed.
pub async fn exec<F>(scope: &ContainerScope, command: &str, mut on_line: F) -> Result<i64>
where
    F: FnMut(&str) + Send,
{
    let runtime = scope.runtime();
    let handle = scope.handle();

    debug!(command, container = %handle, "starting exec");
    let mut session = runtime.exec_stream(handle, command).await?;

    info!("----BEGIN STDOUT----");
    while let Some(line) = session.output.next().await {
        let line = line?;
        info!(target: "convoy::output", "{}", line);
        on_line(&line);
    }
    info!("----END STDOUT----");

    let exit_code = runtime.exec_exit_code(&session.id).await?;
    debug!(command, exit_code, "got exit code");
    Ok(exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;
    use convoy_core::ports::ContainerRuntime;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    async fn scope(runtime: &Arc<FakeRuntime>) -> ContainerScope {
        let handle = runtime
            .create_and_start("alpine", &BTreeMap::new())
            .await
            .unwrap();
        ContainerScope::new(runtime.clone(), handle)
    }

    #[tokio::test]
    async fn test_zero_exit_captures_output() {
        let runtime = Arc::new(FakeRuntime::new().script("echo hello", &["hello"], 0));
        let scope = scope(&runtime).await;

        let outcome = run_in_container("echo hello", Some(&scope)).await.unwrap();

        assert_eq!(outcome, Outcome::Succeeded(vec!["hello".to_string()]));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_task_failure() {
        let runtime = Arc::new(FakeRuntime::new().script("make", &["step 1", "error"], 2));
        let scope = scope(&runtime).await;

        let outcome = run_in_container("make", Some(&scope)).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Failed(TaskFailure::CommandFailed {
                command: "make".to_string(),
                exit_code: 2,
                output: vec!["step 1".to_string(), "error".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_exec_streams_lines_in_order() {
        let runtime = Arc::new(FakeRuntime::new().script("seq 3", &["1", "2", "3"], 0));
        let scope = scope(&runtime).await;
        let mut seen = Vec::new();

        let code = exec(&scope, "seq 3", |line| seen.push(line.to_string()))
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(seen, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_missing_container_is_fault() {
        let err = run_in_container("ls", None).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
