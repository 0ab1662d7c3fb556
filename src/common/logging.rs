//! Logging and tracing configuration
//!
//! Diagnostics go to stderr so that reports written to stdout stay
//! machine-readable. A run can additionally mirror its log to a file.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::paths;

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "apicontract=info,warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Compact stderr layer, built once per subscriber stack
fn stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
}

fn file_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
}

/// Initialize tracing for the CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
///
/// When `log_file` is given, events are also written (without ANSI colors)
/// to that file. The returned guard must be held until exit so buffered
/// lines are flushed.
pub fn init_cli(log_file: Option<&Path>) -> Option<WorkerGuard> {
    if let Some(path) = log_file {
        match open_log_file(path) {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);

                tracing_subscriber::registry()
                    .with(env_filter())
                    .with(file_layer(writer))
                    .with(stderr_layer())
                    .init();

                return Some(guard);
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file '{}': {}", path.display(), e);
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer())
        .init();

    None
}

/// Default log file used when `--log-file` is passed without a path
pub fn default_log_file() -> Option<PathBuf> {
    paths::log_dir().map(|d| d.join("apicontract.log"))
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}
