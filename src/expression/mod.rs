// ABOUTME: Expression module resolving ${{ context.property }} references
// ABOUTME: Exports the context snapshots and the evaluator

pub mod context;
pub mod error;
pub mod evaluator;

pub use context::{EnvContext, GitHubContext, RunnerContext};
pub use error::{ExpressionError, Result};
pub use evaluator::{ExpressionEvaluator, Substituted};
