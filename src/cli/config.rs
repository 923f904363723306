// ABOUTME: Configuration management for the trailrun CLI
// ABOUTME: Loads settings from config files and merges TRAILRUN_* environment overrides

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::minutes_to_duration;
use crate::expression::RunnerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Docker,
    Host,
}

impl std::str::FromStr for DriverKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(DriverKind::Docker),
            "host" => Ok(DriverKind::Host),
            other => Err(anyhow::anyhow!(
                "Unknown driver '{}'. Expected 'docker' or 'host'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,

    pub driver: DriverKind,

    /// Docker CLI used by the docker driver
    pub docker_binary: String,

    /// Mount point of the project inside docker sandboxes
    pub workspace_dir: String,

    /// Run logs go under this directory, relative to the project
    pub log_dir: String,

    pub default_timeout_minutes: Option<f64>,

    pub runner: RunnerContext,

    /// Event name used when `--event` is not given
    pub event_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            driver: DriverKind::Docker,
            docker_binary: "docker".to_string(),
            workspace_dir: "/workspace".to_string(),
            log_dir: "trailrun-logs".to_string(),
            default_timeout_minutes: None,
            runner: RunnerContext::default(),
            event_name: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p),
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            _ => Config::default(),
        };

        config.merge_env()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".trailrun").join("config.yaml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        [
            "trailrun.yaml",
            "trailrun.yml",
            ".trailrun.yaml",
            ".trailrun.yml",
        ]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
    }

    /// Merge environment variables into configuration
    fn merge_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("TRAILRUN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("TRAILRUN_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(driver) = lookup("TRAILRUN_DRIVER") {
            self.driver = driver.parse()?;
        }
        if let Some(docker) = lookup("TRAILRUN_DOCKER") {
            self.docker_binary = docker;
        }
        if let Some(log_dir) = lookup("TRAILRUN_LOG_DIR") {
            self.log_dir = log_dir;
        }
        if let Some(minutes) = lookup("TRAILRUN_TIMEOUT_MINUTES") {
            let minutes: f64 = minutes
                .trim()
                .parse()
                .with_context(|| format!("Invalid TRAILRUN_TIMEOUT_MINUTES '{}'", minutes))?;
            self.default_timeout_minutes = Some(minutes);
        }

        Ok(())
    }

    /// Default step time limit, if a positive one is configured
    pub fn default_step_timeout(&self) -> Option<Duration> {
        self.default_timeout_minutes.and_then(minutes_to_duration)
    }
}
