// ABOUTME: Main library module for the trailrun local workflow runner
// ABOUTME: Exports all core modules and provides the public API

pub mod actions;
pub mod cli;
pub mod container;
pub mod display;
pub mod engine;
pub mod environment;
pub mod expression;
pub mod logging;
pub mod parser;

// Re-export commonly used types
pub use actions::{ActionExecutor, ActionRegistry};
pub use cli::{App, Args, Config};
pub use container::{ContainerDriver, DockerDriver, HostDriver};
pub use engine::{EngineOptions, ExecutionState, RunReport, Status, WorkflowEngine};
pub use environment::EnvironmentResolver;
pub use parser::{Workflow, WorkflowParser, WorkflowValidator};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
