//! Execution results
//!
//! Results are created once per case and never mutated afterwards. Each
//! failure carries expected and actual values so a report can show the
//! difference without re-running the request.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::suite::{CaseSpec, Method};

/// Category of a single failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Status code differed from the expected one
    Status,
    /// A header predicate did not hold
    Header,
    /// A body predicate or capture did not hold
    Body,
    /// The request never produced a response
    Transport,
    /// The request could not be built (placeholder, URL, header)
    Resolve,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Status => "StatusMismatch",
            FailureKind::Header => "HeaderMismatch",
            FailureKind::Body => "BodyMismatch",
            FailureKind::Transport => "TransportError",
            FailureKind::Resolve => "ResolveError",
        };
        f.write_str(name)
    }
}

/// One assertion that did not hold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    /// What was checked, e.g. "status", "header content-type", "/todos/0/id"
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// One-line cause
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            expected: None,
            actual: None,
            message: message.into(),
        }
    }

    pub fn mismatch(
        kind: FailureKind,
        subject: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            subject: subject.into(),
            expected: Some(expected.into()),
            actual: Some(actual.into()),
            message: message.into(),
        }
    }

    pub fn transport(message: impl fmt::Display) -> Self {
        Self::new(FailureKind::Transport, "request", message.to_string())
    }

    pub fn resolve(subject: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(FailureKind::Resolve, subject, message.to_string())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.message)
    }
}

/// The request as actually sent (after placeholder resolution)
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRequest {
    pub method: Method,
    /// Full URL, or the unresolved path if resolution failed
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Outcome of executing one case
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    #[serde(serialize_with = "serialize_case")]
    pub case: Arc<CaseSpec>,
    pub request: ResolvedRequest,
    /// None when no response was received
    pub actual_status: Option<u16>,
    /// Lower-cased header names; repeated headers joined with ", "
    pub actual_headers: BTreeMap<String, String>,
    /// Parsed JSON, raw text as a JSON string, or null when empty
    pub actual_body: Value,
    pub passed: bool,
    pub failures: Vec<Failure>,
    /// Values this case published for later cases
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, Value>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Assemble a result; `passed` is derived from `failures`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        case: Arc<CaseSpec>,
        request: ResolvedRequest,
        actual_status: Option<u16>,
        actual_headers: BTreeMap<String, String>,
        actual_body: Value,
        failures: Vec<Failure>,
        captures: BTreeMap<String, Value>,
        duration_ms: u64,
    ) -> Self {
        Self {
            case,
            request,
            actual_status,
            actual_headers,
            actual_body,
            passed: failures.is_empty(),
            failures,
            captures,
            duration_ms,
        }
    }

    pub fn name(&self) -> &str {
        &self.case.name
    }
}

#[derive(Serialize)]
struct CaseSummary<'a> {
    name: &'a str,
    method: Method,
    path: &'a str,
    tags: &'a [String],
    expected_status: u16,
}

fn serialize_case<S: Serializer>(case: &Arc<CaseSpec>, serializer: S) -> Result<S::Ok, S::Error> {
    CaseSummary {
        name: &case.name,
        method: case.method,
        path: &case.path,
        tags: &case.tags,
        expected_status: case.expect.status,
    }
    .serialize(serializer)
}
