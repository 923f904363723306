// ABOUTME: Error types for workflow parsing and validation
// ABOUTME: Defines the definition errors raised while decoding and checking workflow files

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to read workflow file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Empty workflow: no jobs defined")]
    EmptyWorkflow,

    #[error("Job '{job}' does not declare a runner (runs-on)")]
    MissingRunner { job: String },

    #[error("Invalid step {step} in job '{job}': {reason}")]
    InvalidStep {
        job: String,
        step: usize,
        reason: String,
    },

    #[error("Job '{job}' depends on unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("Circular dependency detected in jobs: {jobs:?}")]
    CircularDependency { jobs: Vec<String> },

    #[error("Unsupported action '{action}' in job '{job}' step {step}. Supported actions: {supported:?}")]
    UnsupportedAction {
        job: String,
        step: usize,
        action: String,
        supported: Vec<String>,
    },

    #[error("Invalid inputs for action in job '{job}' step {step}: {reason}")]
    InvalidActionInputs {
        job: String,
        step: usize,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ParserError>;
