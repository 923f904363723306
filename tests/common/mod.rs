// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides a workflow YAML builder, scratch directories, and a recording sandbox driver

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;

use trailrun::container::{
    ContainerDriver, ContainerError, ExecStatus, OutputSink, OutputStream, SandboxHandle,
};

pub struct TestWorkflowBuilder {
    name: String,
    env: Vec<(String, String)>,
    jobs: Vec<TestJob>,
}

#[derive(Default)]
pub struct TestJob {
    pub id: String,
    pub runs_on: String,
    pub needs: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout_minutes: Option<f64>,
    pub steps: Vec<TestStep>,
}

#[derive(Default)]
pub struct TestStep {
    pub name: Option<String>,
    pub run: Option<String>,
    pub uses: Option<String>,
    pub with: Vec<(String, String)>,
    pub env: Vec<(String, String)>,
}

impl TestStep {
    pub fn run(command: &str) -> Self {
        Self {
            run: Some(command.to_string()),
            ..Default::default()
        }
    }

    pub fn uses(reference: &str) -> Self {
        Self {
            uses: Some(reference.to_string()),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_input(mut self, key: &str, value: &str) -> Self {
        self.with.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }
}

impl TestJob {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            runs_on: "ubuntu-latest".to_string(),
            ..Default::default()
        }
    }

    pub fn needs(mut self, jobs: &[&str]) -> Self {
        self.needs = jobs.iter().map(|j| j.to_string()).collect();
        self
    }

    pub fn runs_on(mut self, runner: &str) -> Self {
        self.runs_on = runner.to_string();
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn timeout_minutes(mut self, minutes: f64) -> Self {
        self.timeout_minutes = Some(minutes);
        self
    }

    pub fn step(mut self, step: TestStep) -> Self {
        self.steps.push(step);
        self
    }
}

fn push_map(yaml: &mut String, indent: &str, key: &str, entries: &[(String, String)]) {
    if entries.is_empty() {
        return;
    }
    yaml.push_str(&format!("{}{}:\n", indent, key));
    for (k, v) in entries {
        yaml.push_str(&format!("{}  {}: {}\n", indent, k, quote(v)));
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl TestWorkflowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            env: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn job(mut self, job: TestJob) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn generate_yaml(&self) -> String {
        let mut yaml = format!("name: {}\non: push\n", quote(&self.name));
        push_map(&mut yaml, "", "env", &self.env);

        yaml.push_str("jobs:\n");
        for job in &self.jobs {
            yaml.push_str(&format!("  {}:\n", job.id));
            yaml.push_str(&format!("    runs-on: {}\n", job.runs_on));
            if !job.needs.is_empty() {
                yaml.push_str(&format!("    needs: [{}]\n", job.needs.join(", ")));
            }
            if let Some(minutes) = job.timeout_minutes {
                yaml.push_str(&format!("    timeout-minutes: {}\n", minutes));
            }
            push_map(&mut yaml, "    ", "env", &job.env);

            yaml.push_str("    steps:\n");
            for step in &job.steps {
                let mut first = true;
                let mut field = |yaml: &mut String, key: &str, value: &str| {
                    let prefix = if first { "      - " } else { "        " };
                    first = false;
                    yaml.push_str(&format!("{}{}: {}\n", prefix, key, quote(value)));
                };
                if let Some(name) = &step.name {
                    field(&mut yaml, "name", name);
                }
                if let Some(run) = &step.run {
                    field(&mut yaml, "run", run);
                }
                if let Some(uses) = &step.uses {
                    field(&mut yaml, "uses", uses);
                }
                push_map(&mut yaml, "        ", "with", &step.with);
                push_map(&mut yaml, "        ", "env", &step.env);
            }
        }

        yaml
    }

    pub async fn write_to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        fs::write(path, self.generate_yaml()).await?;
        Ok(())
    }
}

pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn workflow_file(&self, name: &str) -> PathBuf {
        self.path().join(format!("{}.yml", name))
    }

    pub fn output_file(&self, name: &str) -> PathBuf {
        self.path().join(format!("{}_state.json", name))
    }

    pub async fn create_workflow_file(&self, name: &str, builder: &TestWorkflowBuilder) -> PathBuf {
        let workflow_file = self.workflow_file(name);
        builder
            .write_to_file(&workflow_file)
            .await
            .expect("Failed to write workflow file");
        workflow_file
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Start { image: String },
    Exec { sandbox: String, command: String },
    Stop { sandbox: String },
}

struct Rule {
    needle: String,
    exit_code: i32,
    output: Vec<String>,
    delay: Option<Duration>,
}

/// Sandbox driver that records every call and answers from rules.
/// Commands that match no rule print nothing and exit 0.
#[derive(Default)]
pub struct RecordingDriver {
    rules: Vec<Rule>,
    fail_start_image: Option<String>,
    calls: Mutex<Vec<DriverCall>>,
    envs: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    next_id: Mutex<usize>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, needle: &str, exit_code: i32, output: &[&str]) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            exit_code,
            output: output.iter().map(|s| s.to_string()).collect(),
            delay: None,
        });
        self
    }

    /// Commands containing `needle` take `delay` before succeeding
    pub fn slow(mut self, needle: &str, delay: Duration) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            exit_code: 0,
            output: Vec::new(),
            delay: Some(delay),
        });
        self
    }

    pub fn fail_start_for(mut self, image: &str) -> Self {
        self.fail_start_image = Some(image.to_string());
        self
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Exec { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn starts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Start { image } => Some(image),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Stop { sandbox } => Some(sandbox),
                _ => None,
            })
            .collect()
    }

    pub fn env_for(&self, needle: &str) -> Option<BTreeMap<String, String>> {
        self.envs
            .lock()
            .unwrap()
            .iter()
            .find(|(command, _)| command.contains(needle))
            .map(|(_, env)| env.clone())
    }
}

#[async_trait]
impl ContainerDriver for RecordingDriver {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn start(
        &self,
        image: &str,
        _host_mount: &Path,
        container_mount: &str,
    ) -> Result<SandboxHandle, ContainerError> {
        self.calls.lock().unwrap().push(DriverCall::Start {
            image: image.to_string(),
        });

        if self.fail_start_image.as_deref() == Some(image) {
            return Err(ContainerError::StartFailed {
                image: image.to_string(),
                message: "pull access denied".to_string(),
            });
        }

        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        Ok(SandboxHandle {
            id: format!("sandbox-{}", *next_id),
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
    ) -> Result<ExecStatus, ContainerError> {
        self.calls.lock().unwrap().push(DriverCall::Exec {
            sandbox: handle.id.clone(),
            command: command.to_string(),
        });
        self.envs
            .lock()
            .unwrap()
            .push((command.to_string(), env.clone()));

        let Some(rule) = self.rules.iter().find(|rule| command.contains(&rule.needle)) else {
            return Ok(ExecStatus { exit_code: 0 });
        };

        if let Some(delay) = rule.delay {
            tokio::time::sleep(delay).await;
        }
        for line in &rule.output {
            sink.write_line(OutputStream::Stdout, line);
        }
        Ok(ExecStatus {
            exit_code: rule.exit_code,
        })
    }

    async fn stop(&self, handle: &SandboxHandle) -> Result<(), ContainerError> {
        self.calls.lock().unwrap().push(DriverCall::Stop {
            sandbox: handle.id.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailrun::parser::Workflow;

    #[test]
    fn test_workflow_builder_yaml_parses() {
        let yaml = TestWorkflowBuilder::new("builder")
            .with_env("GREETING", "hi")
            .job(
                TestJob::new("build")
                    .with_env("MODE", "release")
                    .step(TestStep::run("echo $GREETING").named("Greet"))
                    .step(TestStep::uses("actions/setup-node@v4").with_input("node-version", "20")),
            )
            .job(TestJob::new("test").needs(&["build"]).step(TestStep::run("make test")))
            .generate_yaml();

        let workflow = Workflow::from_yaml(&yaml).unwrap();
        assert_eq!(workflow.name, "builder");
        assert_eq!(workflow.env["GREETING"], "hi");
        assert_eq!(workflow.jobs["test"].needs, vec!["build"]);
        assert_eq!(workflow.jobs["build"].steps[0].name.as_deref(), Some("Greet"));
        assert_eq!(workflow.jobs["build"].steps[1].with["node-version"], "20");
    }

    #[test]
    fn test_environment_setup() {
        let env = TestEnvironment::new();
        assert!(env.path().exists());
        assert!(env
            .workflow_file("ci")
            .to_string_lossy()
            .ends_with("ci.yml"));
    }
}
