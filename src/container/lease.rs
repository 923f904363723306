// ABOUTME: Scoped ownership of a job's sandbox
// ABOUTME: Guarantees the sandbox is stopped once, on release or when the lease is dropped

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::Result;
use super::{ContainerDriver, SandboxHandle};

pub struct SandboxLease {
    driver: Arc<dyn ContainerDriver>,
    handle: SandboxHandle,
    released: bool,
}

impl SandboxLease {
    pub async fn acquire(
        driver: Arc<dyn ContainerDriver>,
        image: &str,
        host_mount: &Path,
        container_mount: &str,
    ) -> Result<Self> {
        let handle = driver.start(image, host_mount, container_mount).await?;
        debug!("Acquired sandbox {} ({})", handle.id, driver.name());

        Ok(Self {
            driver,
            handle,
            released: false,
        })
    }

    pub fn handle(&self) -> &SandboxHandle {
        &self.handle
    }

    pub fn driver(&self) -> &Arc<dyn ContainerDriver> {
        &self.driver
    }

    /// Stop the sandbox and consume the lease
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.driver.stop(&self.handle).await
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let driver = Arc::clone(&self.driver);
        let handle = self.handle.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Lease dropped; stopping sandbox {} in background", handle.id);
                runtime.spawn(async move {
                    if let Err(e) = driver.stop(&handle).await {
                        warn!("Failed to stop sandbox {}: {}", handle.id, e);
                    }
                });
            }
            Err(_) => warn!(
                "Lease for sandbox {} dropped outside a runtime; it was not stopped",
                handle.id
            ),
        }
    }
}
