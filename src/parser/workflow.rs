// ABOUTME: Core workflow data structures and parsing functionality
// ABOUTME: Defines the Workflow struct, structural checks, and the file parser

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::{ParserError, Result, ValidationError};
use super::job::{scalar_to_string, Job};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<serde_yaml::Value>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub jobs: IndexMap<String, Job>,
}

impl Workflow {
    /// Parse workflow from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ParserError::IoError)?;
        Self::from_yaml(&content)
    }

    /// Parse workflow from YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(ParserError::YamlError)?;
        let mut workflow = Self::from_value(raw)?;

        // Fill in positional step names so logs and state agree
        for job in workflow.jobs.values_mut() {
            for (index, step) in job.steps.iter_mut().enumerate() {
                if step.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
                    step.name = Some(step.display_name(index));
                }
            }
        }

        workflow.validate_structure()?;

        Ok(workflow)
    }

    fn from_value(mut raw: serde_yaml::Value) -> Result<Self> {
        // Workflow-level env values may be bare numbers or booleans
        if let Some(env) = raw.get_mut("env").and_then(|v| v.as_mapping_mut()) {
            for (_, value) in env.iter_mut() {
                if !value.is_string() {
                    *value = serde_yaml::Value::String(scalar_to_string(value.clone()));
                }
            }
        }
        serde_yaml::from_value(raw).map_err(ParserError::YamlError)
    }

    /// Validate basic workflow structure
    pub fn validate_structure(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ParserError::MissingField("name".to_string()));
        }

        if self.jobs.is_empty() {
            return Err(ValidationError::EmptyWorkflow.into());
        }

        for (job_id, job) in &self.jobs {
            if job.runs_on.trim().is_empty() {
                return Err(ValidationError::MissingRunner {
                    job: job_id.clone(),
                }
                .into());
            }

            for (index, step) in job.steps.iter().enumerate() {
                if step.action().is_none() {
                    let reason = if step.run.is_some() && step.uses.is_some() {
                        "step must specify either 'run' or 'uses', not both"
                    } else {
                        "step must specify either 'run' or 'uses'"
                    };
                    return Err(ValidationError::InvalidStep {
                        job: job_id.clone(),
                        step: index + 1,
                        reason: reason.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Get all job IDs in declaration order
    pub fn job_ids(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    pub fn get_job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn has_job(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// Get all jobs that list `job_id` in their needs
    pub fn get_dependent_jobs(&self, job_id: &str) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|(_, job)| job.needs.iter().any(|need| need == job_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Event name taken from the first trigger in `on`, defaulting to push
    pub fn default_event(&self) -> String {
        use serde_yaml::Value;

        let first = match &self.on {
            Some(Value::String(event)) => Some(event.clone()),
            Some(Value::Sequence(events)) => {
                events.first().and_then(|e| e.as_str()).map(str::to_string)
            }
            Some(Value::Mapping(events)) => events
                .keys()
                .next()
                .and_then(|e| e.as_str())
                .map(str::to_string),
            _ => None,
        };

        first
            .filter(|event| !event.trim().is_empty())
            .unwrap_or_else(|| "push".to_string())
    }

    /// Convert workflow back to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ParserError::YamlError)
    }
}

/// Directory a workflow operates on: the repository root when the file lives
/// under `.github/workflows`, otherwise the file's own directory.
pub fn project_dir_for(workflow_path: &Path) -> PathBuf {
    let absolute = if workflow_path.is_absolute() {
        workflow_path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(workflow_path))
            .unwrap_or_else(|_| workflow_path.to_path_buf())
    };

    let parent = absolute.parent().unwrap_or(Path::new("."));
    let in_workflows_dir = parent.file_name().is_some_and(|n| n == "workflows")
        && parent
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|n| n == ".github");

    match parent.parent().and_then(Path::parent) {
        Some(root) if in_workflows_dir => root.to_path_buf(),
        _ => parent.to_path_buf(),
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowParser;

impl WorkflowParser {
    pub fn new() -> Self {
        Self
    }

    pub async fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Workflow> {
        let content = fs::read_to_string(path.as_ref())
            .await
            .map_err(ParserError::IoError)?;
        self.parse_string(&content)
    }

    pub fn parse_string(&self, content: &str) -> Result<Workflow> {
        Workflow::from_yaml(content)
    }
}

impl Default for WorkflowParser {
    fn default() -> Self {
        Self::new()
    }
}
