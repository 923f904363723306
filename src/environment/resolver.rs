// ABOUTME: Layered environment resolution for steps
// ABOUTME: Applies built-ins, workflow, job, and step layers with literal and $VAR expansion

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use tracing::debug;

use crate::expression::{GitHubContext, RunnerContext};

static VAR_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable reference pattern is valid")
});

pub struct EnvironmentResolver {
    workflow_env: BTreeMap<String, String>,
    job_env: BTreeMap<String, String>,
    github: GitHubContext,
    runner: RunnerContext,
}

impl EnvironmentResolver {
    pub fn new(
        workflow_env: BTreeMap<String, String>,
        github: GitHubContext,
        runner: RunnerContext,
    ) -> Self {
        Self {
            workflow_env,
            job_env: BTreeMap::new(),
            github,
            runner,
        }
    }

    /// Install the job layer; subsequent step environments include it
    pub fn set_job(&mut self, job_id: &str, job_env: BTreeMap<String, String>) {
        debug!("Setting job environment for '{}' ({} vars)", job_id, job_env.len());
        self.github.job = job_id.to_string();
        self.github.action.clear();
        self.job_env = job_env;
    }

    pub fn github(&self) -> &GitHubContext {
        &self.github
    }

    pub fn runner(&self) -> &RunnerContext {
        &self.runner
    }

    /// Effective environment for a shell step
    pub fn build_step_environment(
        &mut self,
        step_env: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        self.github.action.clear();
        self.resolve_layers(step_env)
    }

    /// Effective environment for an action step; `GITHUB_ACTION` carries the reference
    pub fn build_step_environment_for_action(
        &mut self,
        step_env: &BTreeMap<String, String>,
        action: &str,
    ) -> BTreeMap<String, String> {
        self.github.action = action.to_string();
        self.resolve_layers(step_env)
    }

    fn resolve_layers(&self, step_env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut env = self.builtin_variables();

        for layer in [&self.workflow_env, &self.job_env, step_env] {
            for (key, value) in layer {
                let expanded = self.expand(value, &env);
                env.insert(key.clone(), expanded);
            }
        }

        env
    }

    fn builtin_variables(&self) -> BTreeMap<String, String> {
        let github = &self.github;
        let runner = &self.runner;

        [
            ("GITHUB_REPOSITORY", github.repository.as_str()),
            ("GITHUB_SHA", &github.sha),
            ("GITHUB_REF", &github.ref_name),
            ("GITHUB_WORKSPACE", &github.workspace),
            ("GITHUB_EVENT_NAME", &github.event_name),
            ("GITHUB_ACTOR", &github.actor),
            ("GITHUB_RUN_ID", &github.run_id),
            ("GITHUB_RUN_NUMBER", &github.run_number),
            ("GITHUB_JOB", &github.job),
            ("GITHUB_ACTION", &github.action),
            ("GITHUB_ACTION_PATH", &github.action_path),
            ("CI", "true"),
            ("GITHUB_ACTIONS", "true"),
            ("RUNNER_OS", &runner.os),
            ("RUNNER_ARCH", &runner.arch),
            ("RUNNER_NAME", &runner.name),
            ("RUNNER_TEMP", &runner.temp),
            ("RUNNER_TOOL_CACHE", &runner.tool_cache),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
    }

    /// Expand one value: exact context spellings first, then `$NAME`/`${NAME}`
    fn expand(&self, value: &str, current: &BTreeMap<String, String>) -> String {
        let literal = self.expand_context_literals(value);

        VAR_REFERENCE
            .replace_all(&literal, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map_or("", |m| m.as_str());
                match current.get(name) {
                    Some(resolved) => resolved.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn expand_context_literals(&self, value: &str) -> String {
        if !value.contains("${{") {
            return value.to_string();
        }

        const GITHUB_PROPERTIES: [&str; 8] = [
            "repository",
            "sha",
            "ref",
            "workspace",
            "event_name",
            "actor",
            "run_id",
            "run_number",
        ];
        const RUNNER_PROPERTIES: [&str; 4] = ["os", "arch", "temp", "tool_cache"];

        let mut result = value.to_string();
        for property in GITHUB_PROPERTIES {
            if let Some(resolved) = self.github.property(property) {
                result = result.replace(&format!("${{{{ github.{} }}}}", property), resolved);
            }
        }
        for property in RUNNER_PROPERTIES {
            if let Some(resolved) = self.runner.property(property) {
                result = result.replace(&format!("${{{{ runner.{} }}}}", property), resolved);
            }
        }
        result
    }
}
