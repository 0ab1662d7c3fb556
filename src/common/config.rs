//! Configuration file handling
//!
//! Values are layered: defaults, then the TOML file, then overrides coming
//! from the command line (clap already folds `APICONTRACT_*` environment
//! variables into those).

use reqwest::Url;
use serde::Deserialize;
use std::path::Path;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Service under test
    #[serde(default)]
    pub target: TargetConfig,

    /// Session bootstrap settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Scheduling settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Service under test
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Base URL every case path is joined onto
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "https://apichallenges.herokuapp.com/".to_string()
}

/// Session bootstrap settings
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Path (relative to the base URL) that issues a session token on POST
    #[serde(default = "default_bootstrap_path")]
    pub bootstrap_path: String,

    /// Header carrying the token, both in the bootstrap response and on
    /// every subsequent request
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// JSON pointer into the bootstrap body, tried when the header is absent
    #[serde(default)]
    pub token_field: Option<String>,

    /// Timeout for the bootstrap call
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bootstrap_path: default_bootstrap_path(),
            token_header: default_token_header(),
            token_field: None,
            timeout_secs: default_session_timeout(),
        }
    }
}

fn default_bootstrap_path() -> String {
    "challenger".to_string()
}
fn default_token_header() -> String {
    "x-challenger".to_string()
}
fn default_session_timeout() -> u64 {
    10
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Default per-case request timeout
    #[serde(default = "default_request")]
    pub request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: default_request(),
        }
    }
}

fn default_request() -> u64 {
    30
}

/// Scheduling settings
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Maximum concurrent requests for cases marked independent
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    1
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub workers: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from `path`, or from the default config file
    ///
    /// Returns default configuration if no path is given and the default
    /// file doesn't exist. An explicit path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None => match config_path() {
                Some(path) if path.exists() => Self::load_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Apply command-line overrides on top of file values
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.base_url {
            self.target.base_url = url.clone();
        }
        if let Some(workers) = overrides.workers {
            self.run.workers = workers;
        }
        if let Some(secs) = overrides.request_timeout_secs {
            self.timeouts.request_secs = secs;
        }
    }

    /// Check values that cannot be expressed in the type system
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.run.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.session.token_header.trim().is_empty() {
            return Err(Error::Config("session.token_header must not be empty".to_string()));
        }
        if self.timeouts.request_secs == 0 || self.session.timeout_secs == 0 {
            return Err(Error::Config("timeouts must be at least 1 second".to_string()));
        }
        Ok(())
    }

    /// Parsed base URL, normalised to end with `/`
    ///
    /// Case paths are joined relative to it, so a base of
    /// `http://host/api` must become `http://host/api/` or the last
    /// segment would be replaced.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self.target.base_url.trim();
        let mut url =
            Url::parse(raw).map_err(|e| Error::invalid_base_url(raw, e))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::invalid_base_url(
                    raw,
                    format!("unsupported scheme '{}'", other),
                ))
            }
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(Error::invalid_base_url(raw, "URL has no host"));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}
