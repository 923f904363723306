// ABOUTME: Workflow validation logic and dependency checking
// ABOUTME: Collects every definition problem in a workflow into a single report

use std::collections::HashSet;
use std::sync::Arc;

use super::error::{Result, ValidationError};
use super::job::{is_known_runner, StepAction};
use super::workflow::Workflow;
use crate::actions::ActionRegistry;
use crate::engine::{DependencyGraph, GraphError};

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub is_valid: bool,
}

pub struct WorkflowValidator {
    action_registry: Option<Arc<ActionRegistry>>,
}

impl WorkflowValidator {
    pub fn new() -> Self {
        Self {
            action_registry: None,
        }
    }

    pub fn with_action_registry(mut self, action_registry: Arc<ActionRegistry>) -> Self {
        self.action_registry = Some(action_registry);
        self
    }

    /// Validate a complete workflow
    pub fn validate(&self, workflow: &Workflow) -> Result<ValidationReport> {
        let mut report = ValidationReport::new();

        if workflow.jobs.is_empty() {
            report.errors.push(ValidationError::EmptyWorkflow);
        }

        self.validate_dependencies(workflow, &mut report);
        self.validate_jobs(workflow, &mut report);

        report.is_valid = report.errors.is_empty();
        Ok(report)
    }

    /// Validate job dependencies and detect cycles
    fn validate_dependencies(&self, workflow: &Workflow, report: &mut ValidationReport) {
        let job_ids: HashSet<&str> = workflow.jobs.keys().map(String::as_str).collect();
        let mut unknown = false;

        for (job_id, job) in &workflow.jobs {
            for dependency in &job.needs {
                if !job_ids.contains(dependency.as_str()) {
                    unknown = true;
                    report.errors.push(ValidationError::UnknownDependency {
                        job: job_id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        // Ordering is only meaningful once every reference resolves
        if unknown || workflow.jobs.is_empty() {
            return;
        }

        let order = DependencyGraph::from_workflow(workflow).and_then(|g| g.execution_order());
        if let Err(GraphError::CircularDependency { jobs }) = order {
            report
                .errors
                .push(ValidationError::CircularDependency { jobs });
        }
    }

    fn validate_jobs(&self, workflow: &Workflow, report: &mut ValidationReport) {
        for (job_id, job) in &workflow.jobs {
            if job.runs_on.trim().is_empty() {
                report.errors.push(ValidationError::MissingRunner {
                    job: job_id.clone(),
                });
            } else if !is_known_runner(&job.runs_on) {
                report.warnings.push(format!(
                    "Job '{}' runs on '{}', which is used as a container image as-is",
                    job_id, job.runs_on
                ));
            }

            if job.steps.is_empty() {
                report
                    .warnings
                    .push(format!("Job '{}' has no steps", job_id));
            }

            for (index, step) in job.steps.iter().enumerate() {
                match step.action() {
                    None => report.errors.push(ValidationError::InvalidStep {
                        job: job_id.clone(),
                        step: index + 1,
                        reason: "step must specify exactly one of 'run' or 'uses'".to_string(),
                    }),
                    Some(StepAction::Uses(reference)) => {
                        self.validate_action(job_id, index + 1, reference, step, report)
                    }
                    Some(StepAction::Run(_)) => {}
                }
            }
        }
    }

    fn validate_action(
        &self,
        job_id: &str,
        step_number: usize,
        reference: &str,
        step: &super::job::Step,
        report: &mut ValidationReport,
    ) {
        let Some(ref registry) = self.action_registry else {
            return;
        };

        match registry.get(reference) {
            None => report.errors.push(ValidationError::UnsupportedAction {
                job: job_id.to_string(),
                step: step_number,
                action: reference.to_string(),
                supported: registry.supported_actions(),
            }),
            Some(action) => {
                if let Err(e) = action.validate_inputs(&step.with) {
                    report.errors.push(ValidationError::InvalidActionInputs {
                        job: job_id.to_string(),
                        step: step_number,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            is_valid: true,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl Default for WorkflowValidator {
    fn default() -> Self {
        Self::new()
    }
}
