// ABOUTME: Durable per-run log files written as a run observer
// ABOUTME: One workflow.log per run plus one timestamped log per job

pub mod error;
pub mod writer;

use chrono::Local;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::container::OutputStream;
use crate::engine::{ExecutionState, RunEvent, RunObserver, Status};
pub use error::{LoggingError, Result};
pub use writer::{format_line, LogFile};

const DIR_TIMESTAMP: &str = "%Y-%m-%d-%H-%M-%S";

pub struct WorkflowLogger {
    base_path: PathBuf,
    workflow: LogFile,
    jobs: Mutex<HashMap<String, Arc<LogFile>>>,
    inputs_logged: Mutex<HashSet<String>>,
}

impl WorkflowLogger {
    /// Create `<project_dir>/<log_dir>/workflow-<timestamp>/` and its workflow.log
    pub fn create(workflow_name: &str, project_dir: &Path, log_dir: &str) -> Result<Self> {
        let now = Local::now();
        let base_path = project_dir
            .join(log_dir)
            .join(format!("workflow-{}", now.format(DIR_TIMESTAMP)));

        std::fs::create_dir_all(&base_path).map_err(|source| LoggingError::CreateDirectory {
            path: base_path.clone(),
            source,
        })?;

        let workflow = LogFile::create(&base_path.join("workflow.log"))?;
        workflow.write_raw(&format!(
            "\n==============================================\n\
             trailrun - local workflow runner\n\
             ==============================================\n\
             Workflow: {}\n\
             Started:  {}\n\
             ==============================================\n",
            workflow_name,
            now.format("%Y-%m-%d %H:%M:%S %Z")
        ));

        debug!("Writing run logs to {}", base_path.display());

        Ok(Self {
            base_path,
            workflow,
            jobs: Mutex::new(HashMap::new()),
            inputs_logged: Mutex::new(HashSet::new()),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.base_path
    }

    /// Log file for `job_id`, created on first use
    fn job_log(&self, job_id: &str) -> Option<Arc<LogFile>> {
        let mut jobs = self.jobs.lock().ok()?;
        if let Some(log) = jobs.get(job_id) {
            return Some(Arc::clone(log));
        }

        let file_name = format!("{}-{}.log", job_id, Local::now().format(DIR_TIMESTAMP));
        match LogFile::create(&self.base_path.join(file_name)) {
            Ok(log) => {
                let log = Arc::new(log);
                jobs.insert(job_id.to_string(), Arc::clone(&log));
                Some(log)
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// Close every job log, then the workflow log
    pub fn close(&self) {
        if let Ok(jobs) = self.jobs.lock() {
            let mut ids: Vec<&String> = jobs.keys().collect();
            ids.sort();
            for id in ids {
                jobs[id].close(&format!("=== Job '{}' logging completed ===", id));
            }
        }
        self.workflow.close("=== Workflow logging completed ===");
    }

    fn log_job_input(&self, job: &LogFile, job_id: &str, key: &str, value: &str) {
        let first = self
            .inputs_logged
            .lock()
            .map(|mut logged| logged.insert(job_id.to_string()))
            .unwrap_or(false);
        if first {
            job.write_line("Job-level inputs:");
        }
        job.write_line(&format!("  {}: {}", key, value));
    }
}

fn format_duration(duration: Duration) -> String {
    format!("{:.3?}", duration)
}

impl RunObserver for WorkflowLogger {
    fn on_event(&self, event: &RunEvent, _state: &ExecutionState) {
        match event {
            RunEvent::WorkflowStarted { name } => {
                self.workflow
                    .group("Starting workflow execution", [format!("Workflow: {}", name)]);
            }
            RunEvent::PlanResolved { order } => {
                self.workflow.group(
                    "Execution Plan",
                    [format!("Job execution order: [{}]", order.join(", "))],
                );
            }
            RunEvent::WorkflowFinished {
                status: Status::Success,
                duration,
                ..
            } => {
                self.workflow.group(
                    "Workflow completed successfully",
                    [format!("Total duration: {}", format_duration(*duration))],
                );
            }
            RunEvent::WorkflowFinished { error, .. } => {
                self.workflow
                    .write_line(&format!("{}Workflow failed", writer::ERROR));
                if let Some(error) = error {
                    self.workflow.write_line(&format!("Error: {}", error));
                }
            }
            RunEvent::JobStarted { job_id, runs_on } => {
                if let Some(job) = self.job_log(job_id) {
                    job.group(
                        "Job Setup",
                        [format!("Job ID: {}", job_id), format!("Runner: {}", runs_on)],
                    );
                }
            }
            RunEvent::SandboxStarted {
                job_id,
                image,
                sandbox_id,
            } => {
                if let Some(job) = self.job_log(job_id) {
                    job.group(
                        "Container Setup",
                        [
                            format!("Docker image: {}", image),
                            format!("Container ID: {}", sandbox_id),
                        ],
                    );
                }
            }
            RunEvent::JobInput { job_id, key, value } => {
                if let Some(job) = self.job_log(job_id) {
                    self.log_job_input(&job, job_id, key, value);
                }
            }
            RunEvent::StepStarted {
                job_id,
                name,
                description,
                ..
            } => {
                if let Some(job) = self.job_log(job_id) {
                    let lines = (!description.is_empty()).then(|| description.clone());
                    job.group(&format!("Run {}", name), lines);
                }
            }
            RunEvent::StepFinished {
                job_id,
                name,
                status,
                duration,
                exit_code,
                ..
            } => {
                if let Some(job) = self.job_log(job_id) {
                    if *status == Status::Success {
                        job.write_line(&format!(
                            "{}Step '{}' completed successfully in {}",
                            writer::SECTION,
                            name,
                            format_duration(*duration)
                        ));
                    } else {
                        job.write_line(&format!(
                            "{}Step '{}' failed in {} (exit code: {})",
                            writer::ERROR,
                            name,
                            format_duration(*duration),
                            exit_code.unwrap_or(1)
                        ));
                    }
                }
            }
            RunEvent::JobFinished {
                job_id,
                status,
                duration,
                error,
            } => {
                let Some(job) = self.job_log(job_id) else {
                    return;
                };
                if *status == Status::Success {
                    job.group(
                        "Job Summary",
                        [
                            format!("Job '{}' completed successfully", job_id),
                            format!("Duration: {}", format_duration(*duration)),
                        ],
                    );
                } else {
                    job.write_line(&format!("{}Job '{}' failed", writer::ERROR, job_id));
                    if let Some(error) = error {
                        job.write_line(&format!("Error: {}", error));
                    }
                }
            }
            RunEvent::SandboxReleaseFailed { job_id, error } => {
                if let Some(job) = self.job_log(job_id) {
                    job.write_line(&format!(
                        "{}Failed to stop container: {}",
                        writer::ERROR,
                        error
                    ));
                }
            }
        }
    }

    fn on_output(&self, job_id: &str, _stream: OutputStream, line: &str) {
        if let Some(job) = self.job_log(job_id) {
            job.write_line(line);
        }
    }
}
