// ABOUTME: Run events published by the engine and the observer interface
// ABOUTME: Observers are notified synchronously after every state change

use std::sync::Arc;
use std::time::Duration;

use super::state::{ExecutionState, Status};
use crate::container::{OutputSink, OutputStream};

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    WorkflowStarted {
        name: String,
    },
    PlanResolved {
        order: Vec<String>,
    },
    JobStarted {
        job_id: String,
        runs_on: String,
    },
    SandboxStarted {
        job_id: String,
        image: String,
        sandbox_id: String,
    },
    JobInput {
        job_id: String,
        key: String,
        value: String,
    },
    StepStarted {
        job_id: String,
        index: usize,
        name: String,
        /// The command for shell steps, the reference for action steps
        description: String,
    },
    StepFinished {
        job_id: String,
        index: usize,
        name: String,
        status: Status,
        duration: Duration,
        exit_code: Option<i32>,
        error: Option<String>,
    },
    JobFinished {
        job_id: String,
        status: Status,
        duration: Duration,
        error: Option<String>,
    },
    SandboxReleaseFailed {
        job_id: String,
        error: String,
    },
    WorkflowFinished {
        status: Status,
        duration: Duration,
        error: Option<String>,
    },
}

pub trait RunObserver: Send + Sync {
    fn on_event(&self, event: &RunEvent, state: &ExecutionState);

    /// One line of step output
    fn on_output(&self, _job_id: &str, _stream: OutputStream, _line: &str) {}
}

/// Fans events out to every registered observer.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn RunObserver>>,
}

impl ObserverSet {
    pub fn push(&mut self, observer: Arc<dyn RunObserver>) {
        self.observers.push(observer);
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn publish(&self, event: &RunEvent, state: &ExecutionState) {
        for observer in &self.observers {
            observer.on_event(event, state);
        }
    }

    /// Output sink that forwards a job's command output to every observer
    pub fn sink_for<'a>(&'a self, job_id: &'a str) -> JobOutputSink<'a> {
        JobOutputSink {
            observers: self,
            job_id,
        }
    }
}

pub struct JobOutputSink<'a> {
    observers: &'a ObserverSet,
    job_id: &'a str,
}

impl OutputSink for JobOutputSink<'_> {
    fn write_line(&self, stream: OutputStream, line: &str) {
        for observer in &self.observers.observers {
            observer.on_output(self.job_id, stream, line);
        }
    }
}
