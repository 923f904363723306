// ABOUTME: Built-in action implementations and the registry that resolves them
// ABOUTME: Maps `uses:` references such as actions/checkout@v4 to native executors

pub mod checkout;
pub mod error;
pub mod setup_node;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::container::{ContainerDriver, ExecStatus, OutputSink, SandboxHandle};
use crate::expression::{GitHubContext, RunnerContext};

pub use error::{ActionError, Result};

/// Everything an action may use while it runs.
pub struct ActionContext<'a> {
    /// The `uses:` reference as written, version suffix included
    pub reference: &'a str,
    /// Inputs after expression expansion
    pub inputs: &'a BTreeMap<String, String>,
    pub env: &'a BTreeMap<String, String>,
    pub github: &'a GitHubContext,
    pub runner: &'a RunnerContext,
    pub driver: &'a dyn ContainerDriver,
    pub sandbox: &'a SandboxHandle,
}

impl ActionContext<'_> {
    /// Run a command in the step's sandbox with the step environment
    pub async fn run(&self, command: &str, sink: &dyn OutputSink) -> Result<ExecStatus> {
        Ok(self
            .driver
            .exec(self.sandbox, command, self.env, sink)
            .await?)
    }

    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub outputs: BTreeMap<String, String>,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn success(outputs: BTreeMap<String, String>) -> Self {
        Self {
            success: true,
            outputs,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            outputs: BTreeMap::new(),
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Canonical reference without a version, e.g. `actions/checkout`
    fn name(&self) -> &'static str;

    fn validate_inputs(&self, inputs: &BTreeMap<String, String>) -> Result<()>;

    async fn execute(&self, ctx: &ActionContext<'_>, sink: &dyn OutputSink)
        -> Result<ActionResult>;
}

pub struct ActionRegistry {
    actions: HashMap<String, Box<dyn ActionExecutor>>,
}

impl ActionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// A registry holding every built-in action
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register(Box::new(checkout::CheckoutAction));
        registry.register(Box::new(setup_node::SetupNodeAction));

        registry
    }

    pub fn register(&mut self, action: Box<dyn ActionExecutor>) {
        self.actions.insert(action.name().to_string(), action);
    }

    /// Strip a trailing `@version` from an action reference
    pub fn canonical_name(reference: &str) -> &str {
        reference
            .trim()
            .rsplit_once('@')
            .map_or(reference.trim(), |(name, _)| name)
    }

    pub fn get(&self, reference: &str) -> Option<&dyn ActionExecutor> {
        self.actions
            .get(Self::canonical_name(reference))
            .map(|action| action.as_ref())
    }

    /// Find the executor for `reference` and check its inputs
    pub fn resolve(
        &self,
        reference: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<&dyn ActionExecutor> {
        let action = self
            .get(reference)
            .ok_or_else(|| ActionError::UnknownAction {
                reference: reference.to_string(),
                supported: self.supported_actions(),
            })?;

        action.validate_inputs(inputs)?;
        Ok(action)
    }

    pub fn supported_actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
