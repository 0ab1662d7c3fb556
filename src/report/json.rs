use std::path::PathBuf;

use super::{emit, Reporter, RunReport};
use crate::common::Result;

/// Writes the whole run as pretty-printed JSON
pub struct JsonReporter {
    output: Option<PathBuf>,
}

impl JsonReporter {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output }
    }
}

impl Reporter for JsonReporter {
    fn report(&self, report: &RunReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        emit(&json, self.output.as_deref(), "JSON")
    }
}
