// ABOUTME: Workflow execution engine module
// ABOUTME: Handles dependency planning, run state, lifecycle events, and job execution

pub mod dependency;
pub mod error;
pub mod events;
pub mod executor;
pub mod state;

pub use dependency::{build_execution_plan, DependencyGraph};
pub use error::{ExecutionError, GraphError, Result};
pub use events::{ObserverSet, RunEvent, RunObserver};
pub use executor::{minutes_to_duration, EngineOptions, RunReport, WorkflowEngine};
pub use state::{ExecutionState, JobState, Status, StepState};
