//! CLI command definitions
//!
//! Defines the clap commands for the apicontract CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::report::ReportFormat;

#[derive(Subcommand)]
pub enum Commands {
    /// Run suites against the service under test
    Run(RunArgs),

    /// List the cases a selection would run, without sending requests
    List {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Validate suite files without sending requests
    Check {
        /// Suite files (YAML)
        #[arg(required = true)]
        suites: Vec<PathBuf>,
    },
}

/// Which suites and cases to use
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Suite files (YAML), merged in the given order
    #[arg(required = true)]
    pub suites: Vec<PathBuf>,

    /// Only run cases carrying this tag (repeatable, e.g. --tag @API)
    #[arg(long = "tag", short = 't')]
    pub tags: Vec<String>,

    /// With --tag, also run cases that carry no tags at all
    #[arg(long)]
    pub include_untagged: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Base URL of the service (overrides the config file)
    #[arg(long, env = "APICONTRACT_BASE_URL")]
    pub base_url: Option<String>,

    /// Concurrent requests for cases marked independent
    #[arg(long, short = 'j', env = "APICONTRACT_WORKERS")]
    pub workers: Option<usize>,

    /// Default per-case request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Reuse an already issued session token instead of bootstrapping
    #[arg(long, env = "APICONTRACT_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    pub format: ReportFormat,

    /// Write the report to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Show request and response bodies and captured values
    #[arg(long, short)]
    pub verbose: bool,
}
