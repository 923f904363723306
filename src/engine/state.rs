// ABOUTME: Per-run execution state for the workflow, its jobs, and their steps
// ABOUTME: Enforces the Pending -> Running -> Success/Failure lifecycle and records timings

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::parser::Workflow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Failure | Status::Skipped)
    }

    fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::Running)
                | (Status::Pending, Status::Skipped)
                | (Status::Running, Status::Success)
                | (Status::Running, Status::Failure)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Running => write!(f, "running"),
            Status::Success => write!(f, "success"),
            Status::Failure => write!(f, "failure"),
            Status::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub name: String,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub runs_on: String,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sandbox_id: Option<String>,
    pub error: Option<String>,
    pub steps: Vec<StepState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub workflow_name: String,
    pub run_id: String,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Jobs in execution order
    pub jobs: IndexMap<String, JobState>,
}

fn elapsed(started: Option<DateTime<Utc>>, finished: Option<DateTime<Utc>>) -> Option<Duration> {
    let started = started?;
    let finished = finished.unwrap_or_else(Utc::now);
    Some((finished - started).to_std().unwrap_or(Duration::ZERO))
}

fn transition(label: &str, current: &mut Status, next: Status) -> bool {
    if current.can_transition_to(next) {
        *current = next;
        true
    } else {
        warn!("Ignoring transition of {} from {} to {}", label, current, next);
        false
    }
}

impl StepState {
    pub fn new(name: String) -> Self {
        Self {
            name,
            status: Status::Pending,
            started_at: None,
            finished_at: None,
            exit_code: None,
            error: None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        elapsed(self.started_at, self.finished_at)
    }
}

impl JobState {
    pub fn duration(&self) -> Option<Duration> {
        elapsed(self.started_at, self.finished_at)
    }
}

impl ExecutionState {
    /// Build the initial state with every job and step Pending. Jobs are
    /// listed in `order`, followed by any job the order does not mention.
    pub fn new(workflow: &Workflow, order: &[String]) -> Self {
        let mut jobs = IndexMap::new();

        let ordered = order
            .iter()
            .filter(|id| workflow.has_job(id))
            .chain(workflow.jobs.keys());

        for job_id in ordered {
            if jobs.contains_key(job_id) {
                continue;
            }
            let Some(job) = workflow.get_job(job_id) else {
                continue;
            };

            let steps = job
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| StepState::new(step.display_name(index)))
                .collect();

            jobs.insert(
                job_id.clone(),
                JobState {
                    job_id: job_id.clone(),
                    runs_on: job.runs_on.clone(),
                    status: Status::Pending,
                    started_at: None,
                    finished_at: None,
                    sandbox_id: None,
                    error: None,
                    steps,
                },
            );
        }

        Self {
            workflow_name: workflow.name.clone(),
            run_id: uuid::Uuid::new_v4().to_string(),
            status: Status::Pending,
            started_at: None,
            finished_at: None,
            error: None,
            jobs,
        }
    }

    pub fn job(&self, job_id: &str) -> Option<&JobState> {
        self.jobs.get(job_id)
    }

    pub fn job_status(&self, job_id: &str) -> Option<Status> {
        self.jobs.get(job_id).map(|job| job.status)
    }

    pub fn step(&self, job_id: &str, index: usize) -> Option<&StepState> {
        self.jobs.get(job_id)?.steps.get(index)
    }

    pub fn duration(&self) -> Option<Duration> {
        elapsed(self.started_at, self.finished_at)
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn start_workflow(&mut self) -> bool {
        let changed = transition("workflow", &mut self.status, Status::Running);
        if changed {
            self.started_at = Some(Utc::now());
        }
        changed
    }

    pub fn finish_workflow(&mut self, status: Status, error: Option<String>) -> bool {
        // A workflow that never started (e.g. an invalid plan) still gets a final status
        if self.status == Status::Pending && status == Status::Failure {
            self.started_at.get_or_insert_with(Utc::now);
            self.status = Status::Running;
        }
        let changed = transition("workflow", &mut self.status, status);
        if changed {
            self.finished_at = Some(Utc::now());
            self.error = error;
        }
        changed
    }

    pub fn start_job(&mut self, job_id: &str) -> bool {
        let Some(job) = self.jobs.get_mut(job_id) else {
            return false;
        };
        let changed = transition(&format!("job '{}'", job_id), &mut job.status, Status::Running);
        if changed {
            job.started_at = Some(Utc::now());
        }
        changed
    }

    pub fn set_sandbox(&mut self, job_id: &str, sandbox_id: &str) {
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.sandbox_id = Some(sandbox_id.to_string());
        }
    }

    pub fn finish_job(&mut self, job_id: &str, status: Status, error: Option<String>) -> bool {
        let Some(job) = self.jobs.get_mut(job_id) else {
            return false;
        };
        let changed = transition(&format!("job '{}'", job_id), &mut job.status, status);
        if changed {
            job.finished_at = Some(Utc::now());
            job.error = error;
        }
        changed
    }

    pub fn start_step(&mut self, job_id: &str, index: usize) -> bool {
        let Some(step) = self
            .jobs
            .get_mut(job_id)
            .and_then(|job| job.steps.get_mut(index))
        else {
            return false;
        };
        let label = format!("step '{}' of job '{}'", step.name, job_id);
        let changed = transition(&label, &mut step.status, Status::Running);
        if changed {
            step.started_at = Some(Utc::now());
        }
        changed
    }

    pub fn finish_step(
        &mut self,
        job_id: &str,
        index: usize,
        status: Status,
        exit_code: Option<i32>,
        error: Option<String>,
    ) -> bool {
        let Some(step) = self
            .jobs
            .get_mut(job_id)
            .and_then(|job| job.steps.get_mut(index))
        else {
            return false;
        };
        let label = format!("step '{}' of job '{}'", step.name, job_id);
        let changed = transition(&label, &mut step.status, status);
        if changed {
            step.finished_at = Some(Utc::now());
            step.exit_code = exit_code;
            step.error = error;
        }
        changed
    }
}
