// ABOUTME: Built-in actions/checkout implementation
// ABOUTME: The project is already mounted, so this prepares and verifies the workspace

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::warn;

use super::{ActionContext, ActionError, ActionExecutor, ActionResult, Result};
use crate::container::{CaptureSink, OutputSink, OutputStream};

pub struct CheckoutAction;

#[async_trait]
impl ActionExecutor for CheckoutAction {
    fn name(&self) -> &'static str {
        "actions/checkout"
    }

    fn validate_inputs(&self, _inputs: &BTreeMap<String, String>) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &ActionContext<'_>, sink: &dyn OutputSink) -> Result<ActionResult> {
        let workspace = ctx.sandbox.workspace.as_str();
        sink.write_line(OutputStream::Stdout, "Setting up workspace for checkout...");

        let env_commands = [
            format!("export GITHUB_WORKSPACE={}", workspace),
            format!("export GITHUB_REPOSITORY={}", ctx.github.repository),
            format!("export GITHUB_SHA={}", ctx.github.sha),
            format!("export GITHUB_REF={}", ctx.github.ref_name),
        ];

        for command in &env_commands {
            let capture = CaptureSink::new(sink);
            let status = ctx.run(command, &capture).await?;
            if !status.success() {
                return Err(ActionError::CommandFailed {
                    action: self.name().to_string(),
                    command: command.clone(),
                    exit_code: status.exit_code,
                    output: capture.captured(),
                });
            }
        }

        let status = ctx.run(&format!("ls -la {}", workspace), sink).await?;
        if !status.success() {
            warn!("Could not list workspace {}", workspace);
            sink.write_line(
                OutputStream::Stderr,
                "Warning: Could not verify workspace contents",
            );
        }

        sink.write_line(OutputStream::Stdout, "Checkout completed - workspace is ready");

        let mut outputs = BTreeMap::new();
        outputs.insert("path".to_string(), workspace.to_string());
        Ok(ActionResult::success(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::mock::ScriptedDriver;
    use crate::container::{ContainerDriver, NullSink};
    use crate::expression::{GitHubContext, RunnerContext};
    use std::path::Path;

    #[tokio::test]
    async fn test_checkout_sets_path_output() {
        let driver = ScriptedDriver::new();
        let sandbox = driver
            .start("ubuntu:latest", Path::new("."), "/workspace")
            .await
            .unwrap();
        let github = GitHubContext::local("octo/widgets", "/workspace");
        let runner = RunnerContext::default();
        let inputs = BTreeMap::new();
        let env = BTreeMap::new();
        let ctx = ActionContext {
            reference: "actions/checkout@v4",
            inputs: &inputs,
            env: &env,
            github: &github,
            runner: &runner,
            driver: &driver,
            sandbox: &sandbox,
        };

        let result = CheckoutAction.execute(&ctx, &NullSink).await.unwrap();

        assert!(result.success);
        assert_eq!(result.outputs["path"], "/workspace");
        let commands = driver.commands();
        assert_eq!(commands[0], "export GITHUB_WORKSPACE=/workspace");
        assert_eq!(commands.last().unwrap(), "ls -la /workspace");
    }

    #[tokio::test]
    async fn test_listing_failure_is_only_a_warning() {
        let driver = ScriptedDriver::new().respond("ls -la", 2, &["No such file or directory"]);
        let sandbox = driver
            .start("ubuntu:latest", Path::new("."), "/workspace")
            .await
            .unwrap();
        let github = GitHubContext::local("octo/widgets", "/workspace");
        let runner = RunnerContext::default();
        let inputs = BTreeMap::new();
        let env = BTreeMap::new();
        let ctx = ActionContext {
            reference: "actions/checkout@v4",
            inputs: &inputs,
            env: &env,
            github: &github,
            runner: &runner,
            driver: &driver,
            sandbox: &sandbox,
        };

        let result = CheckoutAction.execute(&ctx, &NullSink).await.unwrap();
        assert!(result.success);
    }
}
