// ABOUTME: Context snapshots exposed to expressions and built-in variables
// ABOUTME: Collects repository metadata from git once per run with local fallbacks

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use tracing::debug;

const PLACEHOLDER_SHA: &str = "0000000000000000000000000000000000000000";

/// Repository and run metadata, the `github` context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubContext {
    pub repository: String,
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub workspace: String,
    pub event_name: String,
    pub actor: String,
    pub run_id: String,
    pub run_number: String,
    pub job: String,
    pub action: String,
    pub action_path: String,
}

/// Host/runner description, the `runner` context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerContext {
    pub os: String,
    pub arch: String,
    pub name: String,
    pub temp: String,
    pub tool_cache: String,
}

/// Environment mapping accumulated for the current step, the `env` context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvContext {
    vars: BTreeMap<String, String>,
}

impl GitHubContext {
    /// Collect repository metadata for `project_dir`
    pub fn discover(project_dir: &Path, workspace: &str, event_name: &str) -> Self {
        let repository = git_output(project_dir, &["remote", "get-url", "origin"])
            .and_then(|url| repository_from_remote(&url))
            .unwrap_or_else(|| {
                let dir_name = project_dir
                    .canonicalize()
                    .ok()
                    .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
                    .or_else(|| {
                        project_dir
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                    })
                    .unwrap_or_else(|| "workspace".to_string());
                format!("local/{}", dir_name)
            });

        let sha = git_output(project_dir, &["rev-parse", "HEAD"])
            .unwrap_or_else(|| PLACEHOLDER_SHA.to_string());
        let ref_name = git_output(project_dir, &["symbolic-ref", "HEAD"])
            .unwrap_or_else(|| "refs/heads/main".to_string());
        let actor = git_output(project_dir, &["config", "user.name"])
            .unwrap_or_else(|| "local-user".to_string());

        let context = Self {
            repository,
            sha,
            ref_name,
            workspace: workspace.to_string(),
            event_name: event_name.to_string(),
            actor,
            run_id: chrono::Utc::now().timestamp().to_string(),
            run_number: "1".to_string(),
            job: String::new(),
            action: String::new(),
            action_path: String::new(),
        };

        debug!(
            "GitHub context: repository={} sha={} ref={} actor={}",
            context.repository, context.sha, context.ref_name, context.actor
        );

        context
    }

    /// Fixed, git-free context for tests and dry runs
    pub fn local(repository: &str, workspace: &str) -> Self {
        Self {
            repository: repository.to_string(),
            sha: PLACEHOLDER_SHA.to_string(),
            ref_name: "refs/heads/main".to_string(),
            workspace: workspace.to_string(),
            event_name: "push".to_string(),
            actor: "local-user".to_string(),
            run_id: "1".to_string(),
            run_number: "1".to_string(),
            job: String::new(),
            action: String::new(),
            action_path: String::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        let value = match name {
            "repository" => &self.repository,
            "sha" => &self.sha,
            "ref" => &self.ref_name,
            "workspace" => &self.workspace,
            "event_name" => &self.event_name,
            "actor" => &self.actor,
            "run_id" => &self.run_id,
            "run_number" => &self.run_number,
            "job" => &self.job,
            "action" => &self.action,
            "action_path" => &self.action_path,
            _ => return None,
        };
        Some(value.as_str())
    }
}

impl Default for RunnerContext {
    fn default() -> Self {
        Self {
            os: "Linux".to_string(),
            arch: "X64".to_string(),
            name: "trailrun-runner".to_string(),
            temp: "/tmp".to_string(),
            tool_cache: "/opt/hostedtoolcache".to_string(),
        }
    }
}

impl RunnerContext {
    pub fn property(&self, name: &str) -> Option<&str> {
        let value = match name {
            "os" => &self.os,
            "arch" => &self.arch,
            "name" => &self.name,
            "temp" => &self.temp,
            "tool_cache" => &self.tool_cache,
            _ => return None,
        };
        Some(value.as_str())
    }
}

impl EnvContext {
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}

impl From<BTreeMap<String, String>> for EnvContext {
    fn from(vars: BTreeMap<String, String>) -> Self {
        Self::new(vars)
    }
}

fn git_output(project_dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(project_dir)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Extract `owner/repo` from a GitHub remote URL (https or ssh form)
fn repository_from_remote(url: &str) -> Option<String> {
    if !url.contains("github.com") {
        return None;
    }

    let path = url.trim().trim_end_matches('/');
    let mut parts = path.rsplit(['/', ':']);
    let repo = parts.next()?.trim_end_matches(".git");
    let owner = parts.next()?;

    if owner.is_empty() || repo.is_empty() {
        return None;
    }

    Some(format!("{}/{}", owner, repo))
}
