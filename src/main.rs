//! apicontract - contract tests for session-scoped REST APIs
//!
//! Bootstraps a session against the service, runs YAML suites of request
//! cases with that session and reports pass/fail per case.

use clap::Parser;
use apicontract::{cli, commands, common::logging};
use commands::Commands;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apicontract", about = "Contract tests for session-scoped REST APIs")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a file (default location when no path is given)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_file = match cli.log_file {
        Some(path) if path.as_os_str().is_empty() => logging::default_log_file(),
        other => other,
    };
    let guard = logging::init_cli(log_file.as_deref());

    let result = cli::dispatch(cli.command, cli.config.as_deref()).await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        let code = if e.is_fatal_startup() { 2 } else { 1 };
        // exit() skips destructors; flush the file writer first
        drop(guard);
        std::process::exit(code);
    }
}
