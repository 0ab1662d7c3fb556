//! Human-readable terminal output

use colored::Colorize;

use super::{Reporter, RunReport};
use crate::common::{truncate_display, Result};
use crate::runner::ExecutionResult;

/// Prints one line per case, failure details and a summary
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn print_result(&self, index: usize, result: &ExecutionResult) {
        let status = result
            .actual_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());

        if result.passed {
            println!(
                "  {} {:>3}. {} {}",
                "✓".green(),
                index,
                result.name(),
                format!("({} {}, {}ms)", result.request.method, status, result.duration_ms).dimmed()
            );
        } else {
            println!(
                "  {} {:>3}. {} {}",
                "✗".red(),
                index,
                result.name().red(),
                format!("({} {}, {}ms)", result.request.method, status, result.duration_ms).dimmed()
            );
            println!("         {}", result.request.url.dimmed());
            for failure in &result.failures {
                println!("         {} {}", "-".red(), failure.message);
                if let (Some(expected), Some(actual)) = (&failure.expected, &failure.actual) {
                    println!("             expected: {}", expected.green());
                    println!("             actual:   {}", actual.red());
                }
            }
        }

        if self.verbose {
            if let Some(body) = &result.request.body {
                println!("         request:  {}", truncate_display(&body.to_string(), 200).dimmed());
            }
            if !result.actual_body.is_null() {
                println!(
                    "         response: {}",
                    truncate_display(&result.actual_body.to_string(), 200).dimmed()
                );
            }
            for (name, value) in &result.captures {
                println!("         captured {} = {}", name.cyan(), value);
            }
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, report: &RunReport) -> Result<()> {
        println!(
            "\n{} {} {}",
            "Suite:".blue().bold(),
            report.suite.white().bold(),
            format!("against {}", report.base_url).dimmed()
        );
        println!("  {} {}\n", "Session:".cyan(), report.session.token.dimmed());

        for (i, result) in report.results.iter().enumerate() {
            self.print_result(i + 1, result);
        }

        let summary = report.summary;
        let line = format!(
            "{} passed, {} failed, {} total in {}ms",
            summary.passed,
            summary.failed,
            summary.total,
            report.duration_ms()
        );
        if summary.all_passed() {
            println!("\n{} {}\n", "✓".green().bold(), line.green().bold());
        } else {
            println!("\n{} {}\n", "✗".red().bold(), line.red().bold());
        }
        Ok(())
    }
}
