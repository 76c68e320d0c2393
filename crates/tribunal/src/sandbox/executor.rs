//! Docker-backed sandbox executor.
//!
//! Every job runs in a fresh container built from the language's image. The
//! guard returned at creation removes the container when the job finishes,
//! fails, times out, or the surrounding future is dropped.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config as ContainerConfig,
    CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::LanguageConfig;
use crate::error::Error;
use crate::model::Verdict;
use crate::sandbox::{ExecuteFailure, SandboxExecutor, StdinStream};

/// Memory cap for execute jobs.
const EXECUTE_MEMORY_LIMIT_BYTES: i64 = 256 * 1024 * 1024;

/// Hard PID limit inside a job container.
const PIDS_LIMIT: i64 = 100;

/// CPU period/quota pinning a job to one full CPU.
const CPU_PERIOD: i64 = 100_000;
const CPU_QUOTA: i64 = 100_000;

/// Unprivileged in-container user.
const CONTAINER_USER: &str = "1000:1000";

const APPARMOR_PROFILE: &str = "apparmor:docker-default";

/// In-container mount point of the job's work directory.
const CODE_MOUNT: &str = "/code";

/// Docker-based implementation of [`SandboxExecutor`].
#[derive(Debug, Clone)]
pub struct DockerExecutor {
    docker: Docker,
}

impl DockerExecutor {
    /// Connect to the Docker daemon, honoring an optional host override.
    pub fn connect(docker_host: Option<&str>) -> Result<Self, Error> {
        let docker = match docker_host {
            Some(host) => Docker::connect_with_socket(host, 120, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| Error::wrap("executor.connect", "failed to connect to docker daemon", e))?;
        Ok(Self { docker })
    }

    pub fn with_docker(docker: Docker) -> Self {
        Self { docker }
    }

    async fn kill(&self, container_id: &str) {
        if let Err(e) = self
            .docker
            .kill_container(container_id, Some(KillContainerOptions { signal: "SIGKILL" }))
            .await
        {
            warn!(container_id, error = %e, "failed to kill container");
        }
    }

    /// Wait for the container to exit, bounded by a deadline and the caller's
    /// cancellation token. Timing out or being cancelled kills the container.
    async fn wait_for_exit(
        &self,
        op: &'static str,
        container_id: &str,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<i64, ExecuteFailure> {
        let mut wait = self.docker.wait_container(
            container_id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        tokio::select! {
            next = wait.next() => match next {
                Some(Ok(response)) => Ok(response.status_code),
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
                Some(Err(e)) => Err(Error::wrap(op, "failed to wait container", e).into()),
                None => Err(ExecuteFailure::internal(op, "container wait stream ended early")),
            },
            _ = tokio::time::sleep(deadline) => {
                self.kill(container_id).await;
                Err(ExecuteFailure::internal(op, "failed to wait container"))
            }
            _ = cancel.cancelled() => {
                self.kill(container_id).await;
                Err(ExecuteFailure::internal(op, "cancelled while waiting for container"))
            }
        }
    }

    /// Collect the container's stderr log (used for compiler diagnostics).
    async fn collect_stderr(&self, op: &'static str, container_id: &str) -> Result<String, ExecuteFailure> {
        let mut logs = self.docker.logs(
            container_id,
            Some(LogsOptions::<String> {
                stdout: false,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stderr = String::new();
        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => return Err(Error::wrap(op, "failed to read container logs", e).into()),
            }
        }
        Ok(stderr)
    }
}

#[async_trait]
impl SandboxExecutor for DockerExecutor {
    #[instrument(skip(self, cancel, language), fields(image = %language.image))]
    async fn compile(
        &self,
        cancel: &CancellationToken,
        language: &LanguageConfig,
        work_dir: &Path,
    ) -> Result<(), ExecuteFailure> {
        const OP: &str = "executor.compile";

        let config = compile_container_config(language, work_dir);
        let container = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| Error::wrap(OP, "failed to create container", e))?;
        let _guard = ContainerGuard::new(self.docker.clone(), container.id.clone());

        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::wrap(OP, "failed to start container", e))?;

        let status = self
            .wait_for_exit(OP, &container.id, language.compile_time_limit(), cancel)
            .await?;
        let stderr = self.collect_stderr(OP, &container.id).await?;

        debug!(status, "compile container exited");

        if status != 0 {
            return Err(Verdict::CompilationError { message: stderr }.into());
        }
        Ok(())
    }

    #[instrument(skip(self, cancel, language, stdin), fields(image = %language.image))]
    async fn execute(
        &self,
        cancel: &CancellationToken,
        language: &LanguageConfig,
        work_dir: &Path,
        mut stdin: StdinStream,
        wall_timeout: Duration,
    ) -> Result<(), ExecuteFailure> {
        const OP: &str = "executor.execute";

        let config = execute_container_config(language, work_dir);
        let container = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| Error::wrap(OP, "failed to create container", e))?;
        let _guard = ContainerGuard::new(self.docker.clone(), container.id.clone());

        let AttachContainerResults {
            mut output,
            mut input,
        } = self
            .docker
            .attach_container(
                &container.id,
                Some(AttachContainerOptions::<String> {
                    stream: Some(true),
                    stdin: Some(true),
                    stdout: Some(true),
                    stderr: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::wrap(OP, "failed to attach to container", e))?;

        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::wrap(OP, "failed to start container", e))?;

        // Feed stdin and signal EOF. A program that never reads its input
        // would otherwise stall the copy, so the wall timeout covers it too.
        let feed = async {
            tokio::io::copy(&mut stdin, &mut input).await?;
            input.shutdown().await
        };
        match tokio::time::timeout(wall_timeout, feed).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                self.kill(&container.id).await;
                return Err(Error::wrap(OP, "failed to write to container", e).into());
            }
            Err(_) => {
                self.kill(&container.id).await;
                return Err(ExecuteFailure::internal(OP, "failed to wait container"));
            }
        }
        drop(input);

        // Drain stdout/stderr concurrently with the wait; the stream ends
        // when the container exits.
        let drain = tokio::spawn(async move {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                    Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                    Ok(_) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok((stdout, stderr))
        });

        let status = match self
            .wait_for_exit(OP, &container.id, wall_timeout, cancel)
            .await
        {
            Ok(status) => status,
            Err(failure) => {
                drain.abort();
                return Err(failure);
            }
        };

        let (stdout, stderr) = drain
            .await
            .map_err(|e| Error::wrap(OP, "output drain task failed", e))?
            .map_err(|e| Error::wrap(OP, "failed to read container output", e))?;

        debug!(status, stdout_len = stdout.len(), "execute container exited");

        if status != 0 {
            return Err(Verdict::RuntimeError {
                message: format!(
                    "non-zero exit status: {status}: {}",
                    String::from_utf8_lossy(&stderr)
                ),
            }
            .into());
        }

        // The metrics stream rides stderr; both captures are synced before
        // the parser and checker open them.
        write_synced(&work_dir.join("time.txt"), &stderr)
            .await
            .map_err(|e| Error::wrap(OP, "failed to write time file", e))?;
        write_synced(&work_dir.join("output.txt"), &stdout)
            .await
            .map_err(|e| Error::wrap(OP, "failed to write output file", e))?;

        Ok(())
    }
}

fn compile_container_config(language: &LanguageConfig, work_dir: &Path) -> ContainerConfig<String> {
    ContainerConfig {
        image: Some(language.image.clone()),
        cmd: Some(language.compile_command.clone()),
        tty: Some(false),
        open_stdin: Some(false),
        network_disabled: Some(true),
        user: Some(CONTAINER_USER.to_owned()),
        host_config: Some(HostConfig {
            binds: Some(vec![format!("{}:{CODE_MOUNT}:rw", work_dir.display())]),
            memory: Some(language.compile_memory_limit_bytes),
            cpu_period: Some(CPU_PERIOD),
            cpu_quota: Some(CPU_QUOTA),
            pids_limit: Some(PIDS_LIMIT),
            security_opt: Some(vec![APPARMOR_PROFILE.to_owned()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn execute_container_config(language: &LanguageConfig, work_dir: &Path) -> ContainerConfig<String> {
    ContainerConfig {
        image: Some(language.image.clone()),
        cmd: Some(language.run_command.clone()),
        tty: Some(false),
        open_stdin: Some(true),
        stdin_once: Some(true),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        network_disabled: Some(true),
        user: Some(CONTAINER_USER.to_owned()),
        host_config: Some(HostConfig {
            binds: Some(vec![format!("{}:{CODE_MOUNT}:ro", work_dir.display())]),
            cap_drop: Some(vec!["ALL".to_owned()]),
            cap_add: Some(vec!["SYS_CHROOT".to_owned()]),
            readonly_rootfs: Some(true),
            memory: Some(EXECUTE_MEMORY_LIMIT_BYTES),
            cpu_period: Some(CPU_PERIOD),
            cpu_quota: Some(CPU_QUOTA),
            pids_limit: Some(PIDS_LIMIT),
            security_opt: Some(vec![APPARMOR_PROFILE.to_owned()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

/// Removes the container on drop, so every exit path (including panics and
/// dropped futures) cleans up.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl ContainerGuard {
    fn new(docker: Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let docker = self.docker.clone();
        let container_id = std::mem::take(&mut self.container_id);
        tokio::spawn(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = docker.remove_container(&container_id, Some(options)).await {
                warn!(container_id, error = %e, "failed to remove container");
            }
        });
    }
}
