// ABOUTME: Docker CLI backed sandbox driver
// ABOUTME: Starts a long-lived container per job and runs step commands with docker exec

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::error::{ContainerError, Result};
use super::{stream_command, ContainerDriver, ExecStatus, OutputSink, SandboxHandle};

/// Docker sandbox driver for a single workflow run.
///
/// The CLI builds one driver per run, so the set of stopped container ids
/// stays bounded by the number of jobs in that run.
pub struct DockerDriver {
    binary: String,
    /// Containers this driver has stopped; makes `stop` idempotent
    stopped: Mutex<HashSet<String>>,
}

impl DockerDriver {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use a different docker-compatible CLI, such as podman
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            stopped: Mutex::new(HashSet::new()),
        }
    }

    /// Check that the CLI is installed and can reach its daemon
    pub async fn ensure_available(&self) -> Result<()> {
        let output = Command::new(&self.binary)
            .args(["version", "--format", "{{.Server.Version}}"])
            .output()
            .await
            .map_err(|e| ContainerError::Unavailable {
                message: format!("failed to run '{}': {}", self.binary, e),
            })?;

        if !output.status.success() {
            return Err(ContainerError::Unavailable {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(
            "Docker server version: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    fn exec_args(
        handle: &SandboxHandle,
        command: &str,
        env: &BTreeMap<String, String>,
    ) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.extend([
            "-w".to_string(),
            handle.workspace.clone(),
            handle.id.clone(),
            "bash".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]);
        args
    }

    fn is_stopped(&self, id: &str) -> bool {
        self.stopped
            .lock()
            .map(|stopped| stopped.contains(id))
            .unwrap_or(false)
    }

    fn mark_stopped(&self, id: &str) {
        if let Ok(mut stopped) = self.stopped.lock() {
            stopped.insert(id.to_string());
        }
    }
}

impl Default for DockerDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerDriver for DockerDriver {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn start(
        &self,
        image: &str,
        host_mount: &Path,
        container_mount: &str,
    ) -> Result<SandboxHandle> {
        let host_mount = tokio::fs::canonicalize(host_mount).await?;
        let name = format!("trailrun-{}", uuid::Uuid::new_v4().simple());
        let volume = format!("{}:{}", host_mount.display(), container_mount);

        info!("Starting container {} from image {}", name, image);

        let output = Command::new(&self.binary)
            .args(["run", "-d", "--rm", "--name", name.as_str(), "-v", volume.as_str()])
            .args(["-w", container_mount, image, "tail", "-f", "/dev/null"])
            .output()
            .await
            .map_err(|e| ContainerError::StartFailed {
                image: image.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ContainerError::StartFailed {
                image: image.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ContainerError::StartFailed {
                image: image.to_string(),
                message: "docker run did not report a container id".to_string(),
            });
        }

        Ok(SandboxHandle {
            id,
            image: image.to_string(),
            workspace: container_mount.to_string(),
        })
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        command: &str,
        env: &BTreeMap<String, String>,
        sink: &dyn OutputSink,
    ) -> Result<ExecStatus> {
        if self.is_stopped(&handle.id) {
            return Err(ContainerError::NotRunning {
                sandbox_id: handle.id.clone(),
            });
        }

        let mut cmd = Command::new(&self.binary);
        cmd.args(Self::exec_args(handle, command, env));

        stream_command(cmd, sink)
            .await
            .map_err(|e| ContainerError::ExecFailed {
                sandbox_id: handle.id.clone(),
                message: e.to_string(),
            })
    }

    async fn stop(&self, handle: &SandboxHandle) -> Result<()> {
        if self.is_stopped(&handle.id) {
            debug!("Container {} already stopped", handle.id);
            return Ok(());
        }

        let output = Command::new(&self.binary)
            .args(["stop", handle.id.as_str()])
            .output()
            .await
            .map_err(|e| ContainerError::StopFailed {
                sandbox_id: handle.id.clone(),
                message: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && !stderr.contains("No such container") {
            warn!("docker stop {} failed: {}", handle.id, stderr.trim());
            return Err(ContainerError::StopFailed {
                sandbox_id: handle.id.clone(),
                message: stderr.trim().to_string(),
            });
        }

        self.mark_stopped(&handle.id);
        info!("Stopped container {}", handle.id);
        Ok(())
    }
}
