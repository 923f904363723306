// ABOUTME: Live terminal progress for a workflow run
// ABOUTME: Renders job and step transitions with status glyphs and streams step output

use console::style;
use std::time::Duration;

use crate::container::OutputStream;
use crate::engine::{ExecutionState, RunEvent, RunObserver, Status};

pub struct TerminalDisplay {
    show_output: bool,
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self { show_output: true }
    }

    /// Hide command output, showing only lifecycle lines
    pub fn quiet(mut self) -> Self {
        self.show_output = false;
        self
    }

    /// Render the line printed for an event
    pub fn render(&self, event: &RunEvent) -> String {
        match event {
            RunEvent::WorkflowStarted { name } => {
                format!("{} {}", style("Workflow").bold(), style(name).cyan().bold())
            }
            RunEvent::PlanResolved { order } => {
                format!("  {} {}", style("plan:").dim(), order.join(" -> "))
            }
            RunEvent::JobStarted { job_id, runs_on } => format!(
                "\n{} {} {}",
                style(">").blue().bold(),
                style(job_id).bold(),
                style(format!("({})", runs_on)).dim()
            ),
            RunEvent::SandboxStarted {
                image, sandbox_id, ..
            } => format!(
                "  {} {} {}",
                style("sandbox").dim(),
                image,
                style(short_id(sandbox_id)).dim()
            ),
            RunEvent::JobInput { key, value, .. } => {
                format!("  {} {}: {}", style("with").dim(), key, value)
            }
            RunEvent::StepStarted { name, .. } => {
                format!("  {} {}", style("*").yellow(), name)
            }
            RunEvent::StepFinished {
                name,
                status,
                duration,
                exit_code,
                ..
            } => {
                let mut line = format!(
                    "  {} {} {}",
                    glyph(*status),
                    name,
                    style(format_duration(*duration)).dim()
                );
                if let Some(code) = exit_code.filter(|code| *code != 0) {
                    line.push_str(&format!(" {}", style(format!("exit {}", code)).red()));
                }
                line
            }
            RunEvent::JobFinished {
                job_id,
                status,
                duration,
                error,
            } => {
                let mut line = format!(
                    "{} {} {} {}",
                    glyph(*status),
                    style(job_id).bold(),
                    status_label(*status),
                    style(format_duration(*duration)).dim()
                );
                if let Some(error) = error {
                    line.push_str(&format!("\n  {}", style(error).red()));
                }
                line
            }
            RunEvent::SandboxReleaseFailed { job_id, error } => format!(
                "  {} failed to stop sandbox for {}: {}",
                style("!").yellow().bold(),
                job_id,
                error
            ),
            RunEvent::WorkflowFinished {
                status, duration, ..
            } => format!(
                "\n{} workflow {} in {}",
                glyph(*status),
                status_label(*status),
                format_duration(*duration)
            ),
        }
    }
}

fn glyph(status: Status) -> String {
    match status {
        Status::Success => style("✓").green().bold().to_string(),
        Status::Failure => style("✗").red().bold().to_string(),
        Status::Skipped => style("-").dim().to_string(),
        Status::Pending | Status::Running => style("*").yellow().to_string(),
    }
}

fn status_label(status: Status) -> String {
    match status {
        Status::Success => style("succeeded").green().to_string(),
        Status::Failure => style("failed").red().to_string(),
        other => other.to_string(),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 60 {
        format!("{}m{:02}s", duration.as_secs() / 60, duration.as_secs() % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

impl RunObserver for TerminalDisplay {
    fn on_event(&self, event: &RunEvent, _state: &ExecutionState) {
        println!("{}", self.render(event));
    }

    fn on_output(&self, _job_id: &str, stream: OutputStream, line: &str) {
        if !self.show_output {
            return;
        }
        match stream {
            OutputStream::Stdout => println!("    {}", line),
            OutputStream::Stderr => eprintln!("    {}", style(line).dim()),
        }
    }
}
