//! CLI command handling
//!
//! Wires configuration, suites, the session, the runner and a reporter
//! together for each subcommand.

use chrono::Utc;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::commands::{Commands, RunArgs, SelectionArgs};
use crate::common::config::{Config, ConfigOverrides};
use crate::common::{Error, Result};
use crate::report::{self, ReportFormat, RunReport};
use crate::runner::{Runner, RunnerSettings};
use crate::session::SessionManager;
use crate::suite::{Suite, TagFilter};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Run(args) => run(args, config_path).await,
        Commands::List { selection } => list(&selection),
        Commands::Check { suites } => check(&suites),
    }
}

fn filter_of(selection: &SelectionArgs) -> TagFilter {
    TagFilter::new(selection.tags.clone(), selection.include_untagged)
}

async fn run(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let suite = Suite::load_all(&args.selection.suites)?;
    let cases = suite.select(&filter_of(&args.selection))?;

    let mut config = Config::load(config_path)?;
    config.apply(&ConfigOverrides {
        base_url: args.base_url.clone(),
        workers: args.workers,
        request_timeout_secs: args.timeout,
    });
    config.validate()?;
    let settings = RunnerSettings::from_config(&config)?;

    tracing::info!(
        "Running {} of {} cases from '{}' against {} ({} worker{})",
        cases.len(),
        suite.cases.len(),
        suite.name,
        settings.base_url,
        settings.workers,
        if settings.workers == 1 { "" } else { "s" }
    );

    let client = reqwest::Client::builder()
        .user_agent(concat!("apicontract/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

    let sessions = SessionManager::new(client.clone(), settings.base_url.clone(), config.session.clone());
    let session = match args.session_token.as_deref() {
        Some(token) => sessions.resume(token)?,
        None => sessions.acquire().await?,
    };

    let base_url = settings.base_url.to_string();
    let mut runner = Runner::new(client, settings).with_vars(suite.vars.clone());
    let progress = if args.format == ReportFormat::Console && !args.verbose {
        let bar = ProgressBar::new(cases.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("  [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        runner = runner.with_progress(bar.clone());
        Some(bar)
    } else {
        None
    };

    let started_at = Utc::now();
    let results = runner.run(&session, &cases).await;
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    let report = RunReport::new(&suite.name, &base_url, session, started_at, results);
    tracing::info!(
        "Run {} finished: {} passed, {} failed",
        report.run_id,
        report.summary.passed,
        report.summary.failed
    );

    report::reporter_for(args.format, args.output.clone(), args.verbose).report(&report)?;

    if report.summary.all_passed() {
        Ok(())
    } else {
        Err(Error::TestsFailed {
            failed: report.summary.failed,
            total: report.summary.total,
        })
    }
}

fn list(selection: &SelectionArgs) -> Result<()> {
    let suite = Suite::load_all(&selection.suites)?;
    let filter = filter_of(selection);
    let cases = suite.select(&filter)?;

    println!(
        "{} {} {}",
        "Suite:".blue().bold(),
        suite.name.white().bold(),
        format!("({} of {} cases, filter {})", cases.len(), suite.cases.len(), filter.describe()).dimmed()
    );
    for (i, case) in cases.iter().enumerate() {
        let tags = if case.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", case.tags.join(", "))
        };
        let note = if filter.matches(case) { "" } else { " (dependency)" };
        println!(
            "  {:>3}. {:<7} {:<28} {}{}{}",
            i + 1,
            case.method.to_string(),
            case.path,
            case.name,
            tags.cyan(),
            note.dimmed()
        );
    }
    Ok(())
}

fn check(paths: &[std::path::PathBuf]) -> Result<()> {
    let suites = paths
        .iter()
        .map(|p| Suite::read(p))
        .collect::<Result<Vec<_>>>()?;
    let counts: Vec<usize> = suites.iter().map(|s| s.cases.len()).collect();
    // Dependencies may cross files, so only the merged order is validated
    let merged = Suite::merge(suites)?;

    for (path, count) in paths.iter().zip(counts) {
        println!("  {} {} ({} cases)", "✓".green(), path.display(), count);
    }
    println!("\n{} {} cases valid", "✓".green().bold(), merged.cases.len());
    Ok(())
}
