//! Session token lifecycle
//!
//! A run acquires exactly one session before any case executes. The token
//! is then attached to every request under the configured header. There is
//! no retry: without a session no request can be attributed, so a failed
//! bootstrap aborts the run.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;

use crate::common::config::SessionConfig;
use crate::common::{Error, Result};

/// An issued session token, immutable for the rest of the run
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    #[serde(skip)]
    header_name: HeaderName,
    #[serde(skip)]
    header_value: HeaderValue,
}

impl Session {
    /// Wrap a token for use under `header`
    pub fn new(header: &str, token: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header.trim().as_bytes()).map_err(|e| {
            Error::Config(format!("Invalid session header name '{}': {}", header, e))
        })?;
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Session("token is empty".to_string()));
        }
        let header_value = HeaderValue::from_str(token)
            .map_err(|e| Error::Session(format!("token is not a valid header value: {}", e)))?;

        Ok(Self {
            token: token.to_string(),
            issued_at: Utc::now(),
            header_name,
            header_value,
        })
    }

    /// Header the token travels under
    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }
}

/// Return a copy of `headers` with the session token set
///
/// Any header of the same name already in `headers` is replaced; the
/// session header is never overridden by a case.
pub fn attach(session: &Session, headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    out.insert(session.header_name.clone(), session.header_value.clone());
    out
}

/// Acquires the run's session from the service under test
pub struct SessionManager {
    client: reqwest::Client,
    base_url: Url,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(client: reqwest::Client, base_url: Url, config: SessionConfig) -> Self {
        Self {
            client,
            base_url,
            config,
        }
    }

    /// Call the bootstrap endpoint once and extract the issued token
    pub async fn acquire(&self) -> Result<Session> {
        let url = self
            .base_url
            .join(self.config.bootstrap_path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid bootstrap path: {}", e)))?;
        let timeout_secs = self.config.timeout_secs;

        tracing::debug!("Bootstrapping session: POST {}", url);

        let exchange = async {
            let response = self.client.post(url.clone()).send().await?;
            let status = response.status();
            let header = response
                .headers()
                .get(self.config.token_header.as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, header, body))
        };

        let (status, header, body) = tokio::time::timeout(Duration::from_secs(timeout_secs), exchange)
            .await
            .map_err(|_| Error::SessionTimeout(timeout_secs))?
            .map_err(|e| Error::Session(format!("POST {} failed: {}", url, e)))?;

        if !status.is_success() {
            return Err(Error::Session(format!(
                "POST {} returned status {}",
                url,
                status.as_u16()
            )));
        }

        let token = header
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.token_from_body(&body))
            .ok_or_else(|| {
                Error::Session(format!(
                    "response from {} carried no '{}' header{}",
                    url,
                    self.config.token_header,
                    self.config
                        .token_field
                        .as_deref()
                        .map(|f| format!(" or body field '{}'", f))
                        .unwrap_or_default()
                ))
            })?;

        let session = Session::new(&self.config.token_header, &token)?;
        tracing::info!(
            "Session acquired: {}={} (issued {})",
            self.config.token_header,
            session.token,
            session.issued_at.to_rfc3339()
        );
        Ok(session)
    }

    /// Reuse a token issued earlier instead of bootstrapping
    pub fn resume(&self, token: &str) -> Result<Session> {
        let session = Session::new(&self.config.token_header, token)?;
        tracing::info!("Reusing session: {}={}", self.config.token_header, session.token);
        Ok(session)
    }

    fn token_from_body(&self, body: &str) -> Option<String> {
        let pointer = self.config.token_field.as_deref()?;
        let json: serde_json::Value = serde_json::from_str(body).ok()?;
        match json.pointer(pointer)? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::CONTENT_TYPE;

    #[test]
    fn test_attach_does_not_mutate_input() {
        let session = Session::new("x-challenger", "abc-123").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let attached = attach(&session, &headers);

        assert!(headers.get("x-challenger").is_none());
        assert_eq!(attached.get("x-challenger").unwrap(), "abc-123");
        assert_eq!(attached.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_attach_overrides_case_header() {
        let session = Session::new("X-Challenger", "real").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-challenger", HeaderValue::from_static("forged"));

        let attached = attach(&session, &headers);
        let values: Vec<_> = attached.get_all("x-challenger").iter().collect();
        assert_eq!(values, vec!["real"]);
    }

    #[test]
    fn test_rejects_unusable_tokens() {
        assert!(Session::new("x-challenger", "  ").is_err());
        assert!(Session::new("x-challenger", "line\nbreak").is_err());
        assert!(Session::new("bad header", "token").is_err());
    }

    #[test]
    fn test_token_from_body_pointer() {
        let manager = SessionManager::new(
            reqwest::Client::new(),
            Url::parse("http://localhost/").unwrap(),
            SessionConfig {
                token_field: Some("/session/token".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            manager.token_from_body(r#"{"session":{"token":"t-1"}}"#),
            Some("t-1".to_string())
        );
        assert_eq!(manager.token_from_body("not json"), None);
        assert_eq!(manager.token_from_body(r#"{"session":{}}"#), None);
    }
}
