// ABOUTME: Workflow engine driving jobs and steps through their lifecycle
// ABOUTME: Runs jobs in plan order, one sandbox per job, aborting the run on the first failure

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::dependency::build_execution_plan;
use super::error::{ExecutionError, Result};
use super::events::{ObserverSet, RunEvent, RunObserver};
use super::state::{ExecutionState, Status};
use crate::actions::{ActionContext, ActionRegistry};
use crate::container::{ContainerDriver, SandboxHandle, SandboxLease};
use crate::environment::EnvironmentResolver;
use crate::expression::{EnvContext, ExpressionEvaluator, GitHubContext, RunnerContext};
use crate::parser::{Job, ParserError, Step, StepAction, ValidationError, Workflow};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Host directory mounted into every job's sandbox
    pub project_dir: PathBuf,
    /// Where the project appears inside the sandbox
    pub workspace_dir: String,
    /// Overrides the event derived from the workflow's `on:` triggers
    pub event_name: Option<String>,
    pub runner: RunnerContext,
    /// Step time limit used when neither the step nor its job sets one
    pub default_step_timeout: Option<Duration>,
    /// Use this context instead of discovering one from git
    pub github: Option<GitHubContext>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            workspace_dir: "/workspace".to_string(),
            event_name: None,
            runner: RunnerContext::default(),
            default_step_timeout: None,
            github: None,
        }
    }
}

/// Final state of a run and the error that aborted it, if any.
#[derive(Debug)]
pub struct RunReport {
    pub state: ExecutionState,
    pub error: Option<ExecutionError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.state.is_success()
    }

    pub fn into_result(self) -> Result<ExecutionState> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.state),
        }
    }
}

pub struct WorkflowEngine {
    driver: Arc<dyn ContainerDriver>,
    actions: Arc<ActionRegistry>,
    observers: ObserverSet,
    options: EngineOptions,
    cancel: CancellationToken,
}

impl WorkflowEngine {
    pub fn new(
        driver: Arc<dyn ContainerDriver>,
        actions: Arc<ActionRegistry>,
        options: EngineOptions,
    ) -> Self {
        Self {
            driver,
            actions,
            observers: ObserverSet::default(),
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute a complete workflow
    #[instrument(skip(self, workflow), fields(workflow_name = %workflow.name))]
    pub async fn execute(&self, workflow: &Workflow) -> RunReport {
        let started = Instant::now();
        let plan = build_execution_plan(workflow);

        let order = plan.as_ref().map(Vec::clone).unwrap_or_default();
        let mut state = ExecutionState::new(workflow, &order);

        state.start_workflow();
        info!("Starting workflow execution: {} (run_id: {})", workflow.name, state.run_id);
        self.publish(
            &RunEvent::WorkflowStarted {
                name: workflow.name.clone(),
            },
            &state,
        );

        if let Err(graph_error) = plan {
            error!("Failed to build execution plan: {}", graph_error);
            return self.finish(state, Some(ExecutionError::Graph(graph_error)), started);
        }

        info!("Job execution order: {}", order.join(" -> "));
        self.publish(
            &RunEvent::PlanResolved {
                order: order.clone(),
            },
            &state,
        );

        let github = self.github_context(workflow).await;
        let mut resolver =
            EnvironmentResolver::new(workflow.env.clone(), github, self.options.runner.clone());

        let mut failure = None;
        for job_id in &order {
            if self.cancel.is_cancelled() {
                failure = Some(ExecutionError::Cancelled);
                break;
            }

            let Some(job) = workflow.get_job(job_id) else {
                continue;
            };

            if let Err(e) = self.run_job(job_id, job, &mut resolver, &mut state).await {
                error!("Job '{}' failed: {}", job_id, e);
                failure = Some(e);
                break;
            }
        }

        self.finish(state, failure, started)
    }

    fn finish(
        &self,
        mut state: ExecutionState,
        error: Option<ExecutionError>,
        started: Instant,
    ) -> RunReport {
        let status = if error.is_some() {
            Status::Failure
        } else {
            Status::Success
        };
        let message = error.as_ref().map(ToString::to_string);

        state.finish_workflow(status, message.clone());
        info!("Workflow '{}' finished: {}", state.workflow_name, status);
        self.publish(
            &RunEvent::WorkflowFinished {
                status,
                duration: started.elapsed(),
                error: message,
            },
            &state,
        );

        RunReport { state, error }
    }

    async fn github_context(&self, workflow: &Workflow) -> GitHubContext {
        let event = self
            .options
            .event_name
            .clone()
            .unwrap_or_else(|| workflow.default_event());

        if let Some(github) = &self.options.github {
            let mut github = github.clone();
            github.event_name = event;
            return github;
        }

        let project_dir = self.options.project_dir.clone();
        let workspace = self.options.workspace_dir.clone();
        let fallback_workspace = workspace.clone();
        let fallback_event = event.clone();

        tokio::task::spawn_blocking(move || GitHubContext::discover(&project_dir, &workspace, &event))
            .await
            .unwrap_or_else(|e| {
                warn!("Git metadata discovery failed: {}", e);
                let mut github = GitHubContext::local("local/workspace", &fallback_workspace);
                github.event_name = fallback_event;
                github
            })
    }

    #[instrument(skip(self, job, resolver, state))]
    async fn run_job(
        &self,
        job_id: &str,
        job: &Job,
        resolver: &mut EnvironmentResolver,
        state: &mut ExecutionState,
    ) -> Result<()> {
        let started = Instant::now();

        state.start_job(job_id);
        self.publish(
            &RunEvent::JobStarted {
                job_id: job_id.to_string(),
                runs_on: job.runs_on.clone(),
            },
            state,
        );

        resolver.set_job(job_id, job.env.clone());

        let image = job.image();
        let lease = match SandboxLease::acquire(
            Arc::clone(&self.driver),
            &image,
            &self.options.project_dir,
            &self.options.workspace_dir,
        )
        .await
        {
            Ok(lease) => lease,
            Err(source) => {
                let error = ExecutionError::Sandbox {
                    job_id: job_id.to_string(),
                    source,
                };
                return Err(self.fail_job(job_id, error, started, state));
            }
        };

        state.set_sandbox(job_id, &lease.handle().id);
        self.publish(
            &RunEvent::SandboxStarted {
                job_id: job_id.to_string(),
                image: image.clone(),
                sandbox_id: lease.handle().id.clone(),
            },
            state,
        );

        self.publish_job_inputs(job_id, job, resolver, state);

        let outcome = self
            .run_steps(job_id, job, lease.handle(), resolver, state)
            .await;
        let released = lease.release().await;

        match (outcome, released) {
            (Ok(()), Ok(())) => {
                state.finish_job(job_id, Status::Success, None);
                self.publish(
                    &RunEvent::JobFinished {
                        job_id: job_id.to_string(),
                        status: Status::Success,
                        duration: started.elapsed(),
                        error: None,
                    },
                    state,
                );
                Ok(())
            }
            (Ok(()), Err(source)) => {
                let error = ExecutionError::Sandbox {
                    job_id: job_id.to_string(),
                    source,
                };
                Err(self.fail_job(job_id, error, started, state))
            }
            (Err(step_error), Err(stop_error)) => {
                warn!("Failed to stop sandbox for job '{}': {}", job_id, stop_error);
                self.publish(
                    &RunEvent::SandboxReleaseFailed {
                        job_id: job_id.to_string(),
                        error: stop_error.to_string(),
                    },
                    state,
                );
                Err(self.fail_job(job_id, step_error, started, state))
            }
            (Err(step_error), Ok(())) => Err(self.fail_job(job_id, step_error, started, state)),
        }
    }

    fn fail_job(
        &self,
        job_id: &str,
        error: ExecutionError,
        started: Instant,
        state: &mut ExecutionState,
    ) -> ExecutionError {
        let message = error.to_string();
        state.finish_job(job_id, Status::Failure, Some(message.clone()));
        self.publish(
            &RunEvent::JobFinished {
                job_id: job_id.to_string(),
                status: Status::Failure,
                duration: started.elapsed(),
                error: Some(message),
            },
            state,
        );
        error
    }

    /// Expand the job's `with:` inputs and report them
    fn publish_job_inputs(
        &self,
        job_id: &str,
        job: &Job,
        resolver: &mut EnvironmentResolver,
        state: &ExecutionState,
    ) {
        if job.with.is_empty() {
            return;
        }

        let env = EnvContext::new(resolver.build_step_environment(&BTreeMap::new()));
        for (key, value) in &job.with {
            let expanded = expand_expressions(value, resolver, &env);
            self.publish(
                &RunEvent::JobInput {
                    job_id: job_id.to_string(),
                    key: key.clone(),
                    value: expanded,
                },
                state,
            );
        }
    }

    async fn run_steps(
        &self,
        job_id: &str,
        job: &Job,
        sandbox: &SandboxHandle,
        resolver: &mut EnvironmentResolver,
        state: &mut ExecutionState,
    ) -> Result<()> {
        for (index, step) in job.steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }

            let name = step.display_name(index);
            let description = match step.action() {
                Some(StepAction::Run(command)) => command.to_string(),
                Some(StepAction::Uses(reference)) => reference.to_string(),
                None => String::new(),
            };

            state.start_step(job_id, index);
            self.publish(
                &RunEvent::StepStarted {
                    job_id: job_id.to_string(),
                    index,
                    name: name.clone(),
                    description,
                },
                state,
            );

            let started = Instant::now();
            let timeout = self.step_timeout(job, step);
            let result = self
                .run_step_guarded(job_id, &name, index, step, sandbox, resolver, timeout)
                .await;

            let (status, exit_code, message) = match &result {
                Ok(exit_code) => (Status::Success, *exit_code, None),
                Err(e) => (Status::Failure, e.exit_code(), Some(e.to_string())),
            };

            state.finish_step(job_id, index, status, exit_code, message.clone());
            self.publish(
                &RunEvent::StepFinished {
                    job_id: job_id.to_string(),
                    index,
                    name,
                    status,
                    duration: started.elapsed(),
                    exit_code,
                    error: message,
                },
                state,
            );

            result?;
        }

        Ok(())
    }

    fn step_timeout(&self, job: &Job, step: &Step) -> Option<Duration> {
        match step.timeout_minutes.or(job.timeout_minutes) {
            Some(minutes) => minutes_to_duration(minutes),
            None => self.options.default_step_timeout,
        }
    }

    /// Run one step under its time limit and the run's cancellation token
    #[allow(clippy::too_many_arguments)]
    async fn run_step_guarded(
        &self,
        job_id: &str,
        name: &str,
        index: usize,
        step: &Step,
        sandbox: &SandboxHandle,
        resolver: &mut EnvironmentResolver,
        timeout: Option<Duration>,
    ) -> Result<Option<i32>> {
        let work = self.run_step(job_id, name, index, step, sandbox, resolver);

        let limited = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(ExecutionError::StepTimeout {
                        job_id: job_id.to_string(),
                        step: name.to_string(),
                        timeout: limit,
                    }),
                },
                None => work.await,
            }
        };

        tokio::select! {
            result = limited => result,
            _ = self.cancel.cancelled() => {
                warn!("Step '{}' in job '{}' cancelled", name, job_id);
                Err(ExecutionError::Cancelled)
            }
        }
    }

    /// Execute a single step. Returns the exit code for shell steps.
    async fn run_step(
        &self,
        job_id: &str,
        name: &str,
        index: usize,
        step: &Step,
        sandbox: &SandboxHandle,
        resolver: &mut EnvironmentResolver,
    ) -> Result<Option<i32>> {
        let sink = self.observers.sink_for(job_id);

        match step.action() {
            Some(StepAction::Run(command)) => {
                let env = resolver.build_step_environment(&step.env);
                let command = expand_expressions(command, resolver, &EnvContext::new(env.clone()));
                debug!("Running step '{}': {}", name, command);

                let status = self
                    .driver
                    .exec(sandbox, &command, &env, &sink)
                    .await
                    .map_err(|source| ExecutionError::Sandbox {
                        job_id: job_id.to_string(),
                        source,
                    })?;

                if status.success() {
                    Ok(Some(status.exit_code))
                } else {
                    Err(ExecutionError::StepFailed {
                        job_id: job_id.to_string(),
                        step: name.to_string(),
                        exit_code: status.exit_code,
                    })
                }
            }
            Some(StepAction::Uses(reference)) => {
                let env = resolver.build_step_environment_for_action(&step.env, reference);
                let env_context = EnvContext::new(env.clone());
                let inputs: BTreeMap<String, String> = step
                    .with
                    .iter()
                    .map(|(key, value)| {
                        (key.clone(), expand_expressions(value, resolver, &env_context))
                    })
                    .collect();

                let action_error = |source| ExecutionError::Action {
                    job_id: job_id.to_string(),
                    step: name.to_string(),
                    source,
                };

                let action = self
                    .actions
                    .resolve(reference, &inputs)
                    .map_err(action_error)?;
                info!("Running action {} for step '{}'", action.name(), name);

                let ctx = ActionContext {
                    reference,
                    inputs: &inputs,
                    env: &env,
                    github: resolver.github(),
                    runner: resolver.runner(),
                    driver: self.driver.as_ref(),
                    sandbox,
                };
                let result = action.execute(&ctx, &sink).await.map_err(action_error)?;

                for (key, value) in &result.outputs {
                    debug!("Step '{}' output {}={}", name, key, value);
                }

                if result.success {
                    Ok(None)
                } else {
                    Err(ExecutionError::ActionFailed {
                        job_id: job_id.to_string(),
                        step: name.to_string(),
                        message: result
                            .error
                            .unwrap_or_else(|| "action reported failure".to_string()),
                    })
                }
            }
            None => Err(ExecutionError::Definition(ParserError::ValidationError(
                ValidationError::InvalidStep {
                    job: job_id.to_string(),
                    step: index + 1,
                    reason: "step must specify exactly one of 'run' or 'uses'".to_string(),
                },
            ))),
        }
    }

    fn publish(&self, event: &RunEvent, state: &ExecutionState) {
        self.observers.publish(event, state);
    }
}

/// Substitute `${{ }}` expressions, keeping partial results on failure
fn expand_expressions(value: &str, resolver: &EnvironmentResolver, env: &EnvContext) -> String {
    let evaluator = ExpressionEvaluator::new(resolver.github(), resolver.runner(), env);
    let substituted = evaluator.substitute(value);

    if let Some(error) = substituted.error {
        warn!("Failed to evaluate expression in '{}': {}", value, error);
    }

    substituted.value
}

/// Convert a `timeout-minutes` value to a step time limit.
/// Non-positive values and values too large for a `Duration` mean no limit.
pub fn minutes_to_duration(minutes: f64) -> Option<Duration> {
    if !(minutes.is_finite() && minutes > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(minutes * 60.0).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::mock::ScriptedDriver;

    fn engine(driver: Arc<ScriptedDriver>) -> WorkflowEngine {
        let options = EngineOptions {
            github: Some(GitHubContext::local("octo/widgets", "/workspace")),
            ..Default::default()
        };
        WorkflowEngine::new(driver, Arc::new(ActionRegistry::with_builtins()), options)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let workflow = Workflow::from_yaml(
            r#"
name: ok
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: make
      - uses: actions/checkout@v4
"#,
        )
        .unwrap();

        let driver = Arc::new(ScriptedDriver::new());
        let report = engine(driver.clone()).execute(&workflow).await;

        assert!(report.is_success());
        assert_eq!(report.state.job_status("build"), Some(Status::Success));
        assert_eq!(driver.starts(), 1);
        assert_eq!(driver.stops(), 1);
    }

    #[tokio::test]
    async fn test_run_command_expressions_are_expanded() {
        let workflow = Workflow::from_yaml(
            r#"
name: expr
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: echo ${{ github.repository }} on ${{ runner.os }}
"#,
        )
        .unwrap();

        let driver = Arc::new(ScriptedDriver::new());
        engine(driver.clone()).execute(&workflow).await;

        assert_eq!(driver.commands(), vec!["echo octo/widgets on Linux"]);
    }

    #[tokio::test]
    async fn test_action_inputs_use_step_environment() {
        let workflow = Workflow::from_yaml(
            r#"
name: inputs
jobs:
  build:
    runs-on: ubuntu-latest
    env:
      NODE: "20"
    steps:
      - uses: actions/setup-node@v4
        with:
          node-version: ${{ env.NODE }}
"#,
        )
        .unwrap();

        let driver = Arc::new(ScriptedDriver::new().respond("node --version", 0, &["v20.0.0"]));
        let report = engine(driver.clone()).execute(&workflow).await;

        assert!(report.is_success());
        assert!(driver
            .commands()
            .iter()
            .any(|c| c.contains("setup_20.x")));
        let env = driver.env_for("setup_20.x").unwrap();
        assert_eq!(env["GITHUB_ACTION"], "actions/setup-node@v4");
    }

    #[tokio::test]
    async fn test_unknown_action_fails_step() {
        let workflow = Workflow::from_yaml(
            r#"
name: unknown
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/cache@v3
"#,
        )
        .unwrap();

        let driver = Arc::new(ScriptedDriver::new());
        let report = engine(driver.clone()).execute(&workflow).await;

        let message = report.error.as_ref().unwrap().to_string();
        assert!(message.contains("actions/checkout"));
        assert_eq!(
            report.state.step("build", 0).unwrap().status,
            Status::Failure
        );
        assert_eq!(driver.stops(), 1);
    }

    #[test]
    fn test_step_timeout_precedence() {
        let driver = Arc::new(ScriptedDriver::new());
        let mut engine = engine(driver);
        engine.options.default_step_timeout = Some(Duration::from_secs(600));

        let job = Job {
            timeout_minutes: Some(2.0),
            ..Default::default()
        };
        let step = Step {
            timeout_minutes: Some(0.5),
            ..Default::default()
        };

        assert_eq!(engine.step_timeout(&job, &step), Some(Duration::from_secs(30)));
        assert_eq!(
            engine.step_timeout(&job, &Step::default()),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            engine.step_timeout(&Job::default(), &Step::default()),
            Some(Duration::from_secs(600))
        );
    }

    #[test]
    fn test_step_timeout_without_bound() {
        let driver = Arc::new(ScriptedDriver::new());
        let mut engine = engine(driver);
        engine.options.default_step_timeout = Some(Duration::from_secs(600));

        let huge = Step {
            timeout_minutes: Some(1e18),
            ..Default::default()
        };
        let disabled = Step {
            timeout_minutes: Some(0.0),
            ..Default::default()
        };

        assert_eq!(engine.step_timeout(&Job::default(), &huge), None);
        assert_eq!(engine.step_timeout(&Job::default(), &disabled), None);
    }

    #[test]
    fn test_minutes_to_duration() {
        assert_eq!(minutes_to_duration(1.5), Some(Duration::from_secs(90)));
        assert_eq!(minutes_to_duration(-1.0), None);
        assert_eq!(minutes_to_duration(f64::NAN), None);
        assert_eq!(minutes_to_duration(f64::INFINITY), None);
        assert_eq!(minutes_to_duration(1e18), None);
        assert_eq!(minutes_to_duration(f64::MAX), None);
    }
}
