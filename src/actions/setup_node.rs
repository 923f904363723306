// ABOUTME: Built-in actions/setup-node implementation
// ABOUTME: Installs Node.js from NodeSource inside the sandbox and reports installed versions

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{ActionContext, ActionError, ActionExecutor, ActionResult, Result};
use crate::container::{CaptureSink, NullSink, OutputSink, OutputStream};

const DEFAULT_NODE_VERSION: &str = "18";

const PREREQUISITES: [&str; 2] = [
    "apt-get update",
    "apt-get install -y curl ca-certificates gnupg",
];

const NPM_CACHE_SETUP: &str =
    "mkdir -p /home/runner/.npm && npm config set cache /home/runner/.npm";

pub struct SetupNodeAction;

impl SetupNodeAction {
    /// Run a command that must succeed; its output is attached to the error
    async fn require(
        &self,
        ctx: &ActionContext<'_>,
        command: &str,
        sink: &dyn OutputSink,
    ) -> Result<String> {
        let capture = CaptureSink::new(sink);
        let status = ctx.run(command, &capture).await?;

        if !status.success() {
            return Err(ActionError::CommandFailed {
                action: self.name().to_string(),
                command: command.to_string(),
                exit_code: status.exit_code,
                output: capture.captured(),
            });
        }

        Ok(capture.captured())
    }
}

#[async_trait]
impl ActionExecutor for SetupNodeAction {
    fn name(&self) -> &'static str {
        "actions/setup-node"
    }

    fn validate_inputs(&self, inputs: &BTreeMap<String, String>) -> Result<()> {
        match inputs.get("node-version") {
            Some(version) if version.trim().is_empty() => Err(ActionError::InvalidInputs {
                action: self.name().to_string(),
                reason: "node-version cannot be empty".to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn execute(&self, ctx: &ActionContext<'_>, sink: &dyn OutputSink) -> Result<ActionResult> {
        let version = ctx
            .input("node-version")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_NODE_VERSION);

        sink.write_line(OutputStream::Stdout, &format!("Setting up Node.js {}", version));

        for command in PREREQUISITES {
            sink.write_line(
                OutputStream::Stdout,
                &format!("Installing prerequisites: {}", command),
            );
            let status = ctx.run(command, sink).await?;
            if !status.success() {
                warn!("Prerequisite command failed, continuing: {}", command);
                sink.write_line(
                    OutputStream::Stderr,
                    &format!("Warning: prerequisite command failed but continuing: {}", command),
                );
            }
        }

        let install = [
            format!("curl -fsSL https://deb.nodesource.com/setup_{}.x | bash -", version),
            "apt-get install -y nodejs".to_string(),
        ];
        for command in &install {
            sink.write_line(OutputStream::Stdout, &format!("Running: {}", command));
            self.require(ctx, command, sink).await?;
        }

        let mut outputs = BTreeMap::new();

        let node_version = self.require(ctx, "node --version", &NullSink).await?;
        let node_version = node_version.trim().to_string();
        sink.write_line(
            OutputStream::Stdout,
            &format!("Node.js installed: {}", node_version),
        );
        outputs.insert("node-version".to_string(), node_version);

        match self.require(ctx, "npm --version", &NullSink).await {
            Ok(npm_version) => {
                let npm_version = npm_version.trim().to_string();
                sink.write_line(OutputStream::Stdout, &format!("npm installed: {}", npm_version));
                outputs.insert("npm-version".to_string(), npm_version);
            }
            Err(e) => warn!("npm is not available: {}", e),
        }

        if let Err(e) = ctx.run(NPM_CACHE_SETUP, sink).await {
            warn!("npm cache setup failed: {}", e);
        }

        info!("Node.js {} ready", version);
        sink.write_line(OutputStream::Stdout, "Node.js setup completed");

        Ok(ActionResult::success(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::mock::ScriptedDriver;
    use crate::container::{ContainerDriver, SandboxHandle};
    use crate::expression::{GitHubContext, RunnerContext};
    use std::path::Path;

    async fn run_action(
        driver: &ScriptedDriver,
        inputs: BTreeMap<String, String>,
    ) -> Result<ActionResult> {
        let sandbox: SandboxHandle = driver
            .start("ubuntu:latest", Path::new("."), "/workspace")
            .await
            .unwrap();
        let github = GitHubContext::local("octo/widgets", "/workspace");
        let runner = RunnerContext::default();
        let env = BTreeMap::new();
        let ctx = ActionContext {
            reference: "actions/setup-node@v4",
            inputs: &inputs,
            env: &env,
            github: &github,
            runner: &runner,
            driver,
            sandbox: &sandbox,
        };

        SetupNodeAction.execute(&ctx, &NullSink).await
    }

    #[test]
    fn test_validate_inputs() {
        let mut inputs = BTreeMap::new();
        assert!(SetupNodeAction.validate_inputs(&inputs).is_ok());

        inputs.insert("node-version".to_string(), "20".to_string());
        assert!(SetupNodeAction.validate_inputs(&inputs).is_ok());

        inputs.insert("node-version".to_string(), "".to_string());
        assert!(SetupNodeAction.validate_inputs(&inputs).is_err());
    }

    #[tokio::test]
    async fn test_defaults_to_node_18() {
        let driver = ScriptedDriver::new()
            .respond("node --version", 0, &["v18.20.4"])
            .respond("npm --version", 0, &["10.7.0"]);

        let result = run_action(&driver, BTreeMap::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.outputs["node-version"], "v18.20.4");
        assert_eq!(result.outputs["npm-version"], "10.7.0");
        assert!(driver
            .commands()
            .contains(&"curl -fsSL https://deb.nodesource.com/setup_18.x | bash -".to_string()));
    }

    #[tokio::test]
    async fn test_prerequisite_failures_are_tolerated() {
        let driver = ScriptedDriver::new()
            .respond("apt-get update", 100, &["network unreachable"])
            .respond("node --version", 0, &["v20.11.0"]);

        let mut inputs = BTreeMap::new();
        inputs.insert("node-version".to_string(), "20".to_string());
        let result = run_action(&driver, inputs).await.unwrap();

        assert!(result.success);
        assert_eq!(result.outputs["node-version"], "v20.11.0");
    }

    #[tokio::test]
    async fn test_install_failure_aborts_with_output() {
        let driver = ScriptedDriver::new()
            .respond("apt-get install -y nodejs", 100, &["E: Unable to locate package nodejs"]);

        let err = run_action(&driver, BTreeMap::new()).await.err().unwrap();

        match err {
            ActionError::CommandFailed {
                command, output, ..
            } => {
                assert_eq!(command, "apt-get install -y nodejs");
                assert!(output.contains("Unable to locate package"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!driver.commands().iter().any(|c| c == "node --version"));
    }

    #[tokio::test]
    async fn test_missing_npm_is_not_fatal() {
        let driver = ScriptedDriver::new()
            .respond("node --version", 0, &["v18.0.0"])
            .respond("npm --version", 127, &[]);

        let result = run_action(&driver, BTreeMap::new()).await.unwrap();
        assert!(result.success);
        assert!(!result.outputs.contains_key("npm-version"));
    }
}
