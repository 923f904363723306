// ABOUTME: Container module defining the sandbox driver contract
// ABOUTME: Exports drivers, output sinks, and the lease guard that owns a job's sandbox

pub mod docker;
pub mod error;
pub mod host;
pub mod lease;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

pub use docker::DockerDriver;
pub use error::{ContainerError, Result};
pub use host::HostDriver;
pub use lease::SandboxLease;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Receives command output one line at a time, without the trailing newline.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, stream: OutputStream, line: &str);
}

/// Sink that discards everything.
pub struct NullSink;

impl OutputSink for NullSink {
    fn write_line(&self, _stream: OutputStream, _line: &str) {}
}

/// Forwards lines to another sink while keeping a copy.
pub struct CaptureSink<'a> {
    inner: &'a dyn OutputSink,
    lines: Mutex<Vec<String>>,
}

impl<'a> CaptureSink<'a> {
    pub fn new(inner: &'a dyn OutputSink) -> Self {
        Self {
            inner,
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Everything captured so far, one line per entry
    pub fn captured(&self) -> String {
        match self.lines.lock() {
            Ok(lines) => lines.join("\n"),
            Err(poisoned) => poisoned.into_inner().join("\n"),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl OutputSink for CaptureSink<'_> {
    fn write_line(&self, stream: OutputStream, line: &str) {
        self.inner.write_line(stream, line);
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// A running sandbox as returned by [`ContainerDriver::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxHandle {
    pub id: String,
    pub image: String,
    /// Directory commands run in, as seen from inside the sandbox
    pub workspace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStatus {
    pub exit_code: i32,
}

impl ExecStatus {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait ContainerDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a sandbox from `image` with `host_mount` visible at `container_mount`
    async fn start(
        &self,
        image: &str,
        host_mount: &Path,
        container_mount: &str,
    ) -> Result<SandboxHandle>;

    /// Run `command` through a shell, streaming both output streams into `sink`.
    /// Returns once the process has exited and both streams are drained.
    async fn exec(
        &self,
        handle: &SandboxHandle,
        command: &str,
        env: &BTreeMap<String, String>,
        sink: &dyn OutputSink,
    ) -> Result<ExecStatus>;

    /// Stop and remove the sandbox. Stopping an already stopped sandbox is not an error.
    async fn stop(&self, handle: &SandboxHandle) -> Result<()>;
}

/// Spawn `command` and forward its output line by line until both streams close.
pub(crate) async fn stream_command(
    mut command: Command,
    sink: &dyn OutputSink,
) -> std::io::Result<ExecStatus> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;

    let (out, err, status) = tokio::join!(
        drain_lines(stdout, OutputStream::Stdout, sink),
        drain_lines(stderr, OutputStream::Stderr, sink),
        child.wait()
    );
    out?;
    err?;

    Ok(ExecStatus {
        exit_code: status?.code().unwrap_or(-1),
    })
}

async fn drain_lines<R>(reader: R, stream: OutputStream, sink: &dyn OutputSink) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        sink.write_line(stream, line.trim_end_matches(['\n', '\r']));
    }
}
