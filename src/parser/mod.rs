// ABOUTME: Parser module for YAML workflow definitions
// ABOUTME: Exports the workflow model, decoding, and validation

pub mod error;
pub mod job;
pub mod validation;
pub mod workflow;

pub use error::{ParserError, ValidationError};
pub use job::{runner_image, Job, Step, StepAction};
pub use validation::{ValidationReport, WorkflowValidator};
pub use workflow::{project_dir_for, Workflow, WorkflowParser};
