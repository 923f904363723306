// ABOUTME: Error types for sandbox lifecycle operations
// ABOUTME: Covers start, exec, and stop failures reported by container drivers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Container runtime unavailable: {message}")]
    Unavailable { message: String },

    #[error("Failed to start sandbox from image '{image}': {message}")]
    StartFailed { image: String, message: String },

    #[error("Failed to execute command in sandbox {sandbox_id}: {message}")]
    ExecFailed { sandbox_id: String, message: String },

    #[error("Failed to stop sandbox {sandbox_id}: {message}")]
    StopFailed { sandbox_id: String, message: String },

    #[error("Sandbox {sandbox_id} is not running")]
    NotRunning { sandbox_id: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContainerError>;
