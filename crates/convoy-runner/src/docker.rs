//! Container runtime backed by the Docker Engine API.

use async_stream::stream;
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use convoy_core::ports::{ContainerHandle, ContainerRuntime, ExecSession, LineStream};
use convoy_core::{Error, Result};
use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::{debug, info};

/// Keeps the job container alive between exec sessions.
const IDLE_COMMAND: &str = "while true; do sleep 1000; done";

/// Docker-backed [`ContainerRuntime`].
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Container(format!("Failed to connect to Docker: {}", e)))?;

        Ok(Self { docker })
    }

    /// Create with an existing Docker client.
    pub fn with_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

fn shell(command: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()]
}

fn env_list(env: &BTreeMap<String, String>) -> Vec<String> {
    env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
}

/// Missing or already stopped containers count as torn down.
fn ignore_not_found(result: std::result::Result<(), DockerError>, action: &str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(DockerError::DockerResponseServerError {
            status_code: 304 | 404,
            ..
        }) => Ok(()),
        Err(e) => Err(Error::Container(format!("Failed to {} container: {}", action, e))),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_and_start(
        &self,
        image: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<ContainerHandle> {
        let name = format!("convoy_{}", uuid::Uuid::new_v4());

        let container_config = Config {
            image: Some(image.to_string()),
            cmd: Some(shell(IDLE_COMMAND)),
            env: Some(env_list(env)),
            host_config: Some(bollard::models::HostConfig {
                network_mode: Some("bridge".to_string()),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| Error::Container(format!("Failed to create container: {}", e)))?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Container(format!("Failed to start container: {}", e)))?;

        info!(image = %image, container = %name, "Container started");

        Ok(ContainerHandle {
            id: created.id,
            name,
        })
    }

    async fn exec_stream(&self, container: &ContainerHandle, command: &str) -> Result<ExecSession> {
        let exec = self
            .docker
            .create_exec(
                &container.id,
                CreateExecOptions {
                    cmd: Some(shell(command)),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Container(format!("Failed to create exec: {}", e)))?;

        debug!(exec = %exec.id, container = %container, command, "starting exec");

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::Container(format!("Failed to start exec: {}", e)))?
        {
            StartExecResults::Attached { output, .. } => Ok(ExecSession {
                id: exec.id,
                output: split_lines(output.map(|chunk| chunk.map(log_bytes))),
            }),
            StartExecResults::Detached => Err(Error::Container(format!(
                "exec {} started detached, no output to stream",
                exec.id
            ))),
        }
    }

    async fn exec_exit_code(&self, session_id: &str) -> Result<i64> {
        let inspect = self
            .docker
            .inspect_exec(session_id)
            .await
            .map_err(|e| Error::Container(format!("Failed to inspect exec: {}", e)))?;

        inspect.exit_code.ok_or_else(|| {
            Error::Container(format!("exec {} finished without an exit code", session_id))
        })
    }

    async fn remove(&self, container: &ContainerHandle) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        ignore_not_found(
            self.docker.remove_container(&container.id, Some(options)).await,
            "remove",
        )
    }

    async fn stop(&self, container: &ContainerHandle) -> Result<()> {
        ignore_not_found(self.docker.stop_container(&container.id, None).await, "stop")
    }
}

fn log_bytes(chunk: LogOutput) -> Vec<u8> {
    match chunk {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => message.to_vec(),
    }
}

/// Re-chunk raw exec output into lines, trailing whitespace trimmed.
///
/// Bytes are buffered until a newline arrives, so a character split across
/// chunks is decoded whole.
fn split_lines<S, E>(mut output: S) -> LineStream
where
    S: Stream<Item = std::result::Result<Vec<u8>, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    Box::pin(stream! {
        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = output.next().await {
            match chunk {
                Ok(bytes) => {
                    pending.extend_from_slice(&bytes);
                    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        yield Ok(decode_line(&line));
                    }
                }
                Err(e) => {
                    yield Err(Error::Container(format!("exec output stream failed: {}", e)));
                    break;
                }
            }
        }
        if !pending.is_empty() {
            yield Ok(decode_line(&pending));
        }
    })
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}
