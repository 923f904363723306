// ABOUTME: Error types for action resolution and execution
// ABOUTME: Distinguishes unknown actions, bad inputs, failed commands, and sandbox faults

use thiserror::Error;

use crate::container::ContainerError;

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Action '{reference}' not supported (built-in actions available: {})", .supported.join(", "))]
    UnknownAction {
        reference: String,
        supported: Vec<String>,
    },

    #[error("Invalid inputs for {action}: {reason}")]
    InvalidInputs { action: String, reason: String },

    #[error("{action}: command '{command}' failed with exit code {exit_code}\n{output}")]
    CommandFailed {
        action: String,
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] ContainerError),
}

pub type Result<T> = std::result::Result<T, ActionError>;
