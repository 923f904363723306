// ABOUTME: Scripted container driver for unit tests
// ABOUTME: Records every call and answers exec requests from configurable rules

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use super::error::{ContainerError, Result};
use super::{ContainerDriver, ExecStatus, OutputSink, OutputStream, SandboxHandle};

struct Rule {
    needle: String,
    exit_code: i32,
    output: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedDriver {
    rules: Vec<Rule>,
    fail_start: bool,
    starts: Mutex<usize>,
    stops: Mutex<usize>,
    commands: Mutex<Vec<(String, BTreeMap<String, String>)>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `needle` exit with `exit_code` after printing `output`
    pub fn respond(mut self, needle: &str, exit_code: i32, output: &[&str]) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            exit_code,
            output: output.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn starts(&self) -> usize {
        *self.starts.lock().unwrap()
    }

    pub fn stops(&self) -> usize {
        *self.stops.lock().unwrap()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(command, _)| command.clone())
            .collect()
    }

    pub fn env_for(&self, needle: &str) -> Option<BTreeMap<String, String>> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .find(|(command, _)| command.contains(needle))
            .map(|(_, env)| env.clone())
    }
}

#[async_trait]
impl ContainerDriver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn start(
        &self,
        image: &str,
        _host_mount: &Path,
        container_mount: &str,
    ) -> Result<SandboxHandle> {
        if self.fail_start {
            return Err(ContainerError::StartFailed {
                image: image.to_string(),
                message: "image not found".to_string(),
            });
        }

        let mut starts = self.starts.lock().unwrap();
        *starts += 1;
        Ok(SandboxHandle {
            id: format!("sandbox-{}", *starts),
            image: image.to_string(),
            workspace: container_mount.to_string(),
        })
    }

    async fn exec(
        &self,
        _handle: &SandboxHandle,
        command: &str,
        env: &BTreeMap<String, String>,
        sink: &dyn OutputSink,
    ) -> Result<ExecStatus> {
        self.commands
            .lock()
            .unwrap()
            .push((command.to_string(), env.clone()));

        match self.rules.iter().find(|rule| command.contains(&rule.needle)) {
            Some(rule) => {
                for line in &rule.output {
                    sink.write_line(OutputStream::Stdout, line);
                }
                Ok(ExecStatus {
                    exit_code: rule.exit_code,
                })
            }
            None => Ok(ExecStatus { exit_code: 0 }),
        }
    }

    async fn stop(&self, _handle: &SandboxHandle) -> Result<()> {
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }
}
