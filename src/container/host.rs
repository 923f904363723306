// ABOUTME: Host process sandbox driver for machines without a container runtime
// ABOUTME: Runs step commands with bash directly inside the project directory

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::{ContainerError, Result};
use super::{stream_command, ContainerDriver, ExecStatus, OutputSink, SandboxHandle};

/// Runs every job directly on the host. The image is ignored and the
/// workspace is the host directory itself, so jobs share the filesystem.
pub struct HostDriver {
    active: Mutex<HashMap<String, PathBuf>>,
}

impl HostDriver {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    fn working_dir(&self, id: &str) -> Option<PathBuf> {
        self.active.lock().ok()?.get(id).cloned()
    }
}

impl Default for HostDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerDriver for HostDriver {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn start(
        &self,
        image: &str,
        host_mount: &Path,
        _container_mount: &str,
    ) -> Result<SandboxHandle> {
        let dir = tokio::fs::canonicalize(host_mount)
            .await
            .map_err(|e| ContainerError::StartFailed {
                image: image.to_string(),
                message: format!("{}: {}", host_mount.display(), e),
            })?;

        warn!(
            "Running on the host instead of image '{}'; commands run in {}",
            image,
            dir.display()
        );

        let id = format!("host-{}", uuid::Uuid::new_v4().simple());
        if let Ok(mut active) = self.active.lock() {
            active.insert(id.clone(), dir.clone());
        }

        Ok(SandboxHandle {
            id,
            image: image.to_string(),
            workspace: dir.display().to_string(),
        })
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        command: &str,
        env: &BTreeMap<String, String>,
        sink: &dyn OutputSink,
    ) -> Result<ExecStatus> {
        let dir = self
            .working_dir(&handle.id)
            .ok_or_else(|| ContainerError::NotRunning {
                sandbox_id: handle.id.clone(),
            })?;

        debug!("Executing on host in {}: {}", dir.display(), command);

        let mut cmd = Command::new("bash");
        cmd.args(["-c", command]).current_dir(&dir).envs(env);

        stream_command(cmd, sink)
            .await
            .map_err(|e| ContainerError::ExecFailed {
                sandbox_id: handle.id.clone(),
                message: e.to_string(),
            })
    }

    async fn stop(&self, handle: &SandboxHandle) -> Result<()> {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&handle.id);
        }
        Ok(())
    }
}
