// ABOUTME: Error types for workflow execution
// ABOUTME: Defines graph errors for planning and execution errors that abort a run

use std::time::Duration;
use thiserror::Error;

use crate::actions::ActionError;
use crate::container::ContainerError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("No jobs found in workflow")]
    EmptyWorkflow,

    #[error("Job '{job}' depends on non-existent job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("Circular dependency detected in workflow jobs: {jobs:?}")]
    CircularDependency { jobs: Vec<String> },
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Invalid workflow definition: {0}")]
    Definition(#[from] crate::parser::ParserError),

    #[error("Dependency error: {0}")]
    Graph(#[from] GraphError),

    #[error("Sandbox error in job '{job_id}': {source}")]
    Sandbox {
        job_id: String,
        #[source]
        source: ContainerError,
    },

    #[error("Step '{step}' in job '{job_id}' failed with exit code {exit_code}")]
    StepFailed {
        job_id: String,
        step: String,
        exit_code: i32,
    },

    #[error("Action in step '{step}' of job '{job_id}' failed: {source}")]
    Action {
        job_id: String,
        step: String,
        #[source]
        source: ActionError,
    },

    #[error("Action in step '{step}' of job '{job_id}' reported failure: {message}")]
    ActionFailed {
        job_id: String,
        step: String,
        message: String,
    },

    #[error("Step '{step}' in job '{job_id}' timed out after {timeout:?}")]
    StepTimeout {
        job_id: String,
        step: String,
        timeout: Duration,
    },

    #[error("Workflow execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Exit code of the failing command, when there was one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionError::StepFailed { exit_code, .. } => Some(*exit_code),
            ExecutionError::Action {
                source: ActionError::CommandFailed { exit_code, .. },
                ..
            } => Some(*exit_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
