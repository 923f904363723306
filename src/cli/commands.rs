// ABOUTME: Command implementations for the trailrun CLI
// ABOUTME: Handles execution of the run and validate commands

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::{Config, DriverKind};
use crate::actions::ActionRegistry;
use crate::container::{ContainerDriver, DockerDriver, HostDriver};
use crate::display::TerminalDisplay;
use crate::engine::{minutes_to_duration, EngineOptions, WorkflowEngine};
use crate::logging::WorkflowLogger;
use crate::parser::{project_dir_for, WorkflowParser, WorkflowValidator};

/// Options for a single `run` invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub event: Option<String>,
    pub output: Option<PathBuf>,
    pub driver: Option<DriverKind>,
    pub timeout_minutes: Option<f64>,
}

/// Execute a workflow command
pub async fn run_workflow(workflow_path: PathBuf, options: RunOptions, config: &Config) -> Result<()> {
    info!("Starting workflow execution: {}", workflow_path.display());

    let workflow = WorkflowParser::new()
        .parse_file(&workflow_path)
        .await
        .with_context(|| format!("Failed to parse workflow {}", workflow_path.display()))?;
    info!("Loaded workflow: {}", workflow.name);

    let project_dir = project_dir_for(&workflow_path);
    info!("Project directory: {}", project_dir.display());

    let driver_kind = options.driver.unwrap_or(config.driver);
    let driver = build_driver(driver_kind, config).await?;

    let workspace_dir = match driver_kind {
        DriverKind::Docker => config.workspace_dir.clone(),
        DriverKind::Host => project_dir.to_string_lossy().to_string(),
    };

    let default_step_timeout = match options.timeout_minutes {
        Some(minutes) => minutes_to_duration(minutes),
        None => config.default_step_timeout(),
    };

    let engine_options = EngineOptions {
        project_dir: project_dir.clone(),
        workspace_dir,
        event_name: options.event.clone().or_else(|| config.event_name.clone()),
        runner: config.runner.clone(),
        default_step_timeout,
        github: None,
    };

    let logger = Arc::new(
        WorkflowLogger::create(&workflow.name, &project_dir, &config.log_dir)
            .context("Failed to set up run logs")?,
    );

    let cancel = CancellationToken::new();
    let engine = WorkflowEngine::new(driver, Arc::new(ActionRegistry::with_builtins()), engine_options)
        .with_observer(logger.clone())
        .with_observer(Arc::new(TerminalDisplay::new()))
        .with_cancellation(cancel.clone());

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling workflow");
            cancel.cancel();
        }
    });

    let report = engine.execute(&workflow).await;
    interrupt.abort();
    logger.close();

    println!("Logs written to {}", logger.log_path().display());

    if let Some(output_path) = &options.output {
        write_state(output_path, &report.state)?;
        info!("Results written to: {}", output_path.display());
    }

    if report.is_success() {
        info!("Workflow execution completed");
        return Ok(());
    }

    match report.error {
        Some(error) => Err(anyhow::Error::new(error).context(format!(
            "Workflow '{}' failed",
            workflow.name
        ))),
        None => Err(anyhow::anyhow!(
            "Workflow '{}' finished with status: {}",
            workflow.name,
            report.state.status
        )),
    }
}

async fn build_driver(kind: DriverKind, config: &Config) -> Result<Arc<dyn ContainerDriver>> {
    match kind {
        DriverKind::Docker => {
            let driver = DockerDriver::with_binary(config.docker_binary.clone());
            driver
                .ensure_available()
                .await
                .context("Docker is not available; install it or use --driver host")?;
            Ok(Arc::new(driver))
        }
        DriverKind::Host => {
            warn!("Running steps directly on the host without isolation");
            Ok(Arc::new(HostDriver::new()))
        }
    }
}

fn write_state(path: &Path, state: &crate::engine::ExecutionState) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("Failed to serialize run state")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write output file '{}'", path.display()))
}

/// Validate a workflow file
pub async fn validate_workflow(workflow_path: PathBuf, _config: &Config) -> Result<()> {
    info!("Validating workflow: {}", workflow_path.display());

    let workflow = WorkflowParser::new()
        .parse_file(&workflow_path)
        .await
        .with_context(|| format!("Workflow validation failed for {}", workflow_path.display()))?;

    let report = WorkflowValidator::new()
        .with_action_registry(Arc::new(ActionRegistry::with_builtins()))
        .validate(&workflow)
        .context("Workflow validation failed")?;

    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }

    if !report.is_valid {
        for error in &report.errors {
            println!("  error: {}", error);
        }
        return Err(anyhow::anyhow!(
            "Workflow '{}' has {} validation error(s)",
            workflow.name,
            report.errors.len()
        ));
    }

    let steps: usize = workflow.jobs.values().map(|job| job.steps.len()).sum();
    println!("✓ Workflow '{}' is valid", workflow.name);
    println!("  Jobs: {}", workflow.jobs.len());
    println!("  Steps: {}", steps);

    info!("Workflow validation completed successfully");
    Ok(())
}
