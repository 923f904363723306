// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and the run and validate subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::config::DriverKind;

#[derive(Parser)]
#[command(name = "trailrun")]
#[command(about = "Run GitHub Actions style workflows locally")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a workflow file
    Run {
        #[arg(help = "Path to workflow YAML file")]
        workflow: PathBuf,

        #[arg(long, help = "Event name exposed as github.event_name")]
        event: Option<String>,

        #[arg(short, long, help = "Write the final run state as JSON to this file")]
        output: Option<PathBuf>,

        #[arg(long, value_enum, help = "Sandbox driver")]
        driver: Option<DriverKind>,

        #[arg(long, help = "Default per-step time limit in minutes")]
        timeout_minutes: Option<f64>,
    },

    /// Validate a workflow file without executing
    Validate {
        #[arg(help = "Path to workflow YAML file")]
        workflow: PathBuf,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
