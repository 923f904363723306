// ABOUTME: Timestamped, flush-per-line log file writer
// ABOUTME: Formats lines as `<UTC timestamp with 7 fractional digits>Z <message>`

use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use super::error::{LoggingError, Result};

pub const GROUP: &str = "##[group]";
pub const END_GROUP: &str = "##[endgroup]";
pub const ERROR: &str = "##[error]";
pub const SECTION: &str = "##[section]";

/// Render one log line for `message` written at `at`
pub fn format_line(at: DateTime<Utc>, message: &str) -> String {
    let ticks = (at.timestamp_subsec_nanos() / 100).min(9_999_999);
    format!(
        "{}.{:07}Z {}\n",
        at.format("%Y-%m-%dT%H:%M:%S"),
        ticks,
        message
    )
}

pub struct LogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LogFile {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| LoggingError::CreateFile {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write raw text with no timestamp
    pub fn write_raw(&self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    /// Write a timestamped line and flush it to disk
    pub fn write_line(&self, message: &str) {
        self.write_bytes(format_line(Utc::now(), message).as_bytes());
    }

    pub fn group<I, S>(&self, title: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.write_line(&format!("{}{}", GROUP, title));
        for line in lines {
            self.write_line(line.as_ref());
        }
        self.write_line(END_GROUP);
    }

    /// Write the trailer line and close the file; later writes are dropped
    pub fn close(&self, trailer: &str) {
        self.write_line(trailer);
        if let Ok(mut guard) = self.file.lock() {
            guard.take();
        }
    }

    fn write_bytes(&self, bytes: &[u8]) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        let Some(file) = guard.as_mut() else {
            return;
        };

        let written = file.write_all(bytes).and_then(|_| file.sync_data());
        if let Err(e) = written {
            warn!("Failed to write log file {}: {}", self.path.display(), e);
        }
    }
}
