// ABOUTME: Error types for expression evaluation
// ABOUTME: Expression failures are reported and logged but never abort a run

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("Unsupported expression '{expression}': expected <context>.<property>")]
    Unsupported { expression: String },

    #[error("Unknown context '{context}' in expression")]
    UnknownContext { context: String },

    #[error("Unknown property '{property}' in {context} context")]
    UnknownProperty { context: String, property: String },

    #[error("Environment variable '{name}' is not set")]
    MissingVariable { name: String },
}

pub type Result<T> = std::result::Result<T, ExpressionError>;
