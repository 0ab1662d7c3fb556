//! apicontract - contract tests for session-scoped REST APIs
//!
//! The library exposes the pieces the CLI is built from: suite loading,
//! session bootstrap, the case runner and reporters.

pub mod cli;
pub mod commands;
pub mod common;
pub mod report;
pub mod runner;
pub mod session;
pub mod suite;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use report::{Reporter, RunReport};
pub use runner::{ExecutionResult, Runner, RunnerSettings};
pub use session::{Session, SessionManager};
pub use suite::{CaseSpec, Suite, TagFilter};
