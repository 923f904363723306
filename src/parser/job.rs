// ABOUTME: Job and step definitions for workflow files
// ABOUTME: Handles needs normalization, scalar input maps, and runner image mapping

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "runs-on", default)]
    pub runs_on: String,

    #[serde(default, deserialize_with = "string_or_list")]
    pub needs: Vec<String>,

    /// Job-level inputs; expanded and logged before the steps run.
    #[serde(default, deserialize_with = "scalar_map")]
    pub with: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(
        rename = "timeout-minutes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,

    #[serde(default, deserialize_with = "scalar_map")]
    pub with: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,

    #[serde(
        rename = "timeout-minutes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<f64>,
}

/// What a step does once validated: a shell command or an action reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction<'a> {
    Run(&'a str),
    Uses(&'a str),
}

impl Job {
    /// Container image this job's sandbox is started from
    pub fn image(&self) -> String {
        runner_image(&self.runs_on)
    }
}

impl Step {
    /// Display name, falling back to the 1-based position in the job
    pub fn display_name(&self, index: usize) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Step {}", index + 1),
        }
    }

    /// Returns the step's action when exactly one of `run`/`uses` is set.
    pub fn action(&self) -> Option<StepAction<'_>> {
        let run = self.run.as_deref().filter(|s| !s.trim().is_empty());
        let uses = self.uses.as_deref().filter(|s| !s.trim().is_empty());

        match (run, uses) {
            (Some(command), None) => Some(StepAction::Run(command)),
            (None, Some(reference)) => Some(StepAction::Uses(reference.trim())),
            _ => None,
        }
    }
}

/// Map a `runs-on` label to a container image
pub fn runner_image(runs_on: &str) -> String {
    match runs_on {
        "ubuntu-latest" => "ubuntu:latest".to_string(),
        "ubuntu-24.04" => "ubuntu:24.04".to_string(),
        "ubuntu-22.04" => "ubuntu:22.04".to_string(),
        "ubuntu-20.04" => "ubuntu:20.04".to_string(),
        other => other.to_string(),
    }
}

/// Whether `runs-on` names a label from the built-in image table
pub fn is_known_runner(runs_on: &str) -> bool {
    matches!(
        runs_on,
        "ubuntu-latest" | "ubuntu-24.04" | "ubuntu-22.04" | "ubuntu-20.04"
    )
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Needs {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Needs>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Needs::One(job)) => vec![job],
        Some(Needs::Many(jobs)) => jobs,
    })
}

fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, scalar_to_string(value)))
        .collect())
}

pub(crate) fn scalar_to_string(value: serde_yaml::Value) -> String {
    use serde_yaml::Value;

    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s,
        Value::Tagged(tagged) => scalar_to_string(tagged.value),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
