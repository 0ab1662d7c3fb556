//! Case runner
//!
//! Executes cases in declared order against one session. Sequential
//! execution is the default; with more than one worker, consecutive cases
//! marked `independent` run concurrently. Any other case acts as a barrier.
//! Results always come back in input order.

pub mod assertions;
mod context;
mod executor;
mod result;

pub use context::RunContext;
pub use result::{ExecutionResult, Failure, FailureKind, ResolvedRequest};

use futures_util::stream::{self, StreamExt};
use indicatif::ProgressBar;
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::common::config::Config;
use crate::common::Result;
use crate::session::Session;
use crate::suite::CaseSpec;

use executor::Executor;

/// Scheduling and timeout settings for a run
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub workers: usize,
}

impl RunnerSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url()?,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            workers: config.run.workers.max(1),
        })
    }
}

/// Executes cases against a base URL
pub struct Runner {
    executor: Executor,
    workers: usize,
    vars: BTreeMap<String, Value>,
    progress: Option<ProgressBar>,
}

impl Runner {
    pub fn new(client: reqwest::Client, settings: RunnerSettings) -> Self {
        Self {
            executor: Executor::new(client, settings.base_url, settings.request_timeout),
            workers: settings.workers.max(1),
            vars: BTreeMap::new(),
            progress: None,
        }
    }

    /// Suite constants available to every case
    pub fn with_vars(mut self, vars: BTreeMap<String, Value>) -> Self {
        self.vars = vars;
        self
    }

    /// Advance `progress` by one for every finished case
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run `cases` in order and return one result per case, in input order
    pub async fn run(&self, session: &Session, cases: &[Arc<CaseSpec>]) -> Vec<ExecutionResult> {
        let mut ctx = RunContext::new(self.vars.clone());
        let mut results = Vec::with_capacity(cases.len());
        let mut i = 0;

        while i < cases.len() {
            let batch_len = if self.workers > 1 {
                cases[i..].iter().take_while(|c| c.independent).count()
            } else {
                0
            };

            if batch_len > 1 {
                let batch = &cases[i..i + batch_len];
                tracing::debug!(
                    "Running {} independent cases with {} workers",
                    batch.len(),
                    self.workers
                );
                let ctx_ref = &ctx;
                let batch_results: Vec<ExecutionResult> = stream::iter(batch)
                    .map(|case| async move {
                        let result = self.executor.execute(case, session, ctx_ref).await;
                        self.tick(&result);
                        result
                    })
                    .buffered(self.workers)
                    .collect()
                    .await;

                for result in &batch_results {
                    ctx.record(&result.captures);
                }
                results.extend(batch_results);
                i += batch_len;
            } else {
                let result = self.executor.execute(&cases[i], session, &ctx).await;
                self.tick(&result);
                ctx.record(&result.captures);
                results.push(result);
                i += 1;
            }
        }

        results
    }

    fn tick(&self, result: &ExecutionResult) {
        if let Some(progress) = &self.progress {
            progress.set_message(result.name().to_string());
            progress.inc(1);
        }
    }
}
