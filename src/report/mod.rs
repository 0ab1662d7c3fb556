//! Run reports
//!
//! A [`RunReport`] wraps the ordered, immutable results of one run. Reporters
//! only read it; they never re-run a request.

mod console;
mod json;
mod junit;

pub use console::ConsoleReporter;
pub use json::JsonReporter;
pub use junit::JunitReporter;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::common::Result;
use crate::runner::ExecutionResult;
use crate::session::Session;

/// Pass/fail counts
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn of(results: &[ExecutionResult]) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Everything a reporter needs about one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub suite: String,
    pub base_url: String,
    pub session: Session,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: Summary,
    pub results: Vec<ExecutionResult>,
}

impl RunReport {
    pub fn new(
        suite: &str,
        base_url: &str,
        session: Session,
        started_at: DateTime<Utc>,
        results: Vec<ExecutionResult>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            suite: suite.to_string(),
            base_url: base_url.to_string(),
            session,
            started_at,
            finished_at: Utc::now(),
            summary: Summary::of(&results),
            results,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Consumer of a finished run
pub trait Reporter {
    fn report(&self, report: &RunReport) -> Result<()>;
}

/// Output formats selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Console,
    Json,
    Junit,
}

/// Build the reporter for `format`, writing to `output` or stdout
pub fn reporter_for(format: ReportFormat, output: Option<PathBuf>, verbose: bool) -> Box<dyn Reporter> {
    match format {
        ReportFormat::Console => Box::new(ConsoleReporter::new(verbose)),
        ReportFormat::Json => Box::new(JsonReporter::new(output)),
        ReportFormat::Junit => Box::new(JunitReporter::new(output)),
    }
}

/// Write `content` to `output`, or print it
fn emit(content: &str, output: Option<&std::path::Path>, label: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, content)?;
            eprintln!("{} report saved to: {}", label, path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
