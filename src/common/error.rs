//! Error types for the contract harness
//!
//! Only conditions that abort a run are errors. A broken endpoint or a
//! contract violation is recorded as a failure inside the case's
//! `ExecutionResult` instead.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Session Errors ===
    #[error("Session bootstrap failed: {0}")]
    Session(String),

    #[error("Session bootstrap timed out after {0} seconds")]
    SessionTimeout(u64),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    // === Suite Errors ===
    #[error("Failed to parse suite '{path}': {error}")]
    SuiteParse { path: String, error: String },

    #[error("Duplicate case name '{0}'. Case names must be unique across all suites")]
    DuplicateCase(String),

    #[error("Case '{case}' depends on '{dependency}', which is not declared before it")]
    UnknownDependency { case: String, dependency: String },

    #[error("No cases selected by filter {filter}. Use 'apicontract list' to see available cases")]
    NoCasesSelected { filter: String },

    // === Run Outcome ===
    #[error("{failed} of {total} cases failed")]
    TestsFailed { failed: usize, total: usize },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid base URL error
    pub fn invalid_base_url(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidBaseUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an unknown dependency error
    pub fn unknown_dependency(case: &str, dependency: &str) -> Self {
        Self::UnknownDependency {
            case: case.to_string(),
            dependency: dependency.to_string(),
        }
    }

    /// Whether this error aborts the run before any case executes
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::ConfigParse(_)
                | Error::InvalidBaseUrl { .. }
                | Error::SuiteParse { .. }
                | Error::DuplicateCase(_)
                | Error::UnknownDependency { .. }
                | Error::NoCasesSelected { .. }
                | Error::FileRead { .. }
        )
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}
