//! Single case execution
//!
//! Resolves a case against the current context, sends it with its own
//! timeout and turns whatever happens into an [`ExecutionResult`]. This
//! function never fails: transport problems and unresolvable placeholders
//! become failures of the one case.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::session::{self, Session};
use crate::suite::template::{self, value_to_text, VarSource};
use crate::suite::{BodyExpectation, CaseSpec, Expectation, HeaderPredicate, HeaderRules, PointerAssertion};

use super::assertions::{self, Observed};
use super::result::{ExecutionResult, Failure, FailureKind, ResolvedRequest};

/// A request with every placeholder substituted
struct Prepared {
    url: Url,
    headers: HeaderMap,
    body: Option<Value>,
    /// Bytes put on the wire for `body`
    payload: Option<Vec<u8>>,
    expect: Expectation,
}

/// Raw response data
struct Response {
    status: u16,
    headers: BTreeMap<String, String>,
    text: String,
}

pub(crate) struct Executor {
    client: reqwest::Client,
    base_url: Url,
    default_timeout: Duration,
}

impl Executor {
    pub fn new(client: reqwest::Client, base_url: Url, default_timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            default_timeout,
        }
    }

    /// Execute one case; never fails
    pub async fn execute(
        &self,
        case: &Arc<CaseSpec>,
        session: &Session,
        vars: &dyn VarSource,
    ) -> ExecutionResult {
        let started = Instant::now();

        let prepared = match self.prepare(case, session, vars) {
            Ok(prepared) => prepared,
            Err(failure) => {
                tracing::warn!("Case '{}' could not be resolved: {}", case.name, failure.message);
                return ExecutionResult::new(
                    Arc::clone(case),
                    ResolvedRequest {
                        method: case.method,
                        url: case.path.clone(),
                        body: None,
                    },
                    None,
                    BTreeMap::new(),
                    Value::Null,
                    vec![failure],
                    BTreeMap::new(),
                    elapsed_ms(started),
                );
            }
        };

        let request = ResolvedRequest {
            method: case.method,
            url: prepared.url.to_string(),
            body: prepared.body.clone(),
        };
        let timeout = case
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let response = match self.send(case, &prepared, timeout).await {
            Ok(response) => response,
            Err(failure) => {
                tracing::warn!("{} {} failed: {}", case.method, prepared.url, failure.message);
                return ExecutionResult::new(
                    Arc::clone(case),
                    request,
                    None,
                    BTreeMap::new(),
                    Value::Null,
                    vec![failure],
                    BTreeMap::new(),
                    elapsed_ms(started),
                );
            }
        };

        tracing::debug!(
            "{} {} -> {} in {}ms",
            case.method,
            prepared.url,
            response.status,
            started.elapsed().as_millis()
        );

        let parsed: Option<Value> = if response.text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&response.text).ok()
        };

        let observed = Observed {
            status: response.status,
            headers: &response.headers,
            raw_body: &response.text,
            json: parsed.as_ref(),
        };
        let mut failures =
            assertions::check(&prepared.expect, &observed, session, prepared.body.as_ref());
        let captures = capture(case, parsed.as_ref(), &mut failures);

        let actual_body = match parsed {
            Some(json) => json,
            None if response.text.is_empty() => Value::Null,
            None => Value::String(response.text),
        };

        ExecutionResult::new(
            Arc::clone(case),
            request,
            Some(response.status),
            response.headers,
            actual_body,
            failures,
            captures,
            elapsed_ms(started),
        )
    }

    fn prepare(&self, case: &CaseSpec, session: &Session, vars: &dyn VarSource) -> Result<Prepared, Failure> {
        let path = template::resolve_str(&case.path, vars).map_err(|e| Failure::resolve("path", e))?;
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Failure::resolve("path", format!("'{}' is not a valid path: {}", path, e)))?;

        if !case.query.is_empty() {
            let mut pairs = Vec::with_capacity(case.query.len());
            for (name, value) in &case.query {
                let value = template::resolve_value(value, vars)
                    .map_err(|e| Failure::resolve(format!("query {}", name), e))?;
                pairs.push((name.clone(), value_to_text(&value)));
            }
            url.query_pairs_mut().extend_pairs(pairs);
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &case.headers {
            let subject = format!("header {}", name);
            let value = template::resolve_str(value, vars).map_err(|e| Failure::resolve(&subject, e))?;
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Failure::resolve(&subject, e))?;
            let value = HeaderValue::from_str(&value).map_err(|e| Failure::resolve(&subject, e))?;
            headers.insert(name, value);
        }

        let body = case
            .body
            .as_ref()
            .map(|b| template::resolve_value(b, vars))
            .transpose()
            .map_err(|e| Failure::resolve("body", e))?;

        if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        let payload = body.as_ref().map(|b| encode_body(b, &headers)).transpose()?;

        Ok(Prepared {
            url,
            headers: session::attach(session, &headers),
            body,
            payload,
            expect: resolve_expectation(&case.expect, vars)?,
        })
    }

    async fn send(&self, case: &CaseSpec, prepared: &Prepared, timeout: Duration) -> Result<Response, Failure> {
        let mut builder = self
            .client
            .request(case.method.to_reqwest(), prepared.url.clone())
            .headers(prepared.headers.clone());
        if let Some(payload) = &prepared.payload {
            builder = builder.body(payload.clone());
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = collect_headers(response.headers());
            let text = response.text().await?;
            Ok::<_, reqwest::Error>(Response { status, headers, text })
        };

        // Dropping the future on timeout cancels the in-flight request
        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Failure::transport(describe_reqwest_error(&e))),
            Err(_) => Err(Failure::transport(format!(
                "timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

/// Encode a request body for its content type
///
/// A string body under a non-JSON content type goes out as raw text, so
/// `body: "<todo/>"` with `content-type: application/xml` sends XML.
fn encode_body(body: &Value, headers: &HeaderMap) -> Result<Vec<u8>, Failure> {
    let json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |ct| ct.to_ascii_lowercase().contains("json"));
    match body {
        Value::String(text) if !json => Ok(text.as_bytes().to_vec()),
        _ => serde_json::to_vec(body).map_err(|e| Failure::resolve("body", e)),
    }
}

/// Substitute placeholders in expected values
fn resolve_expectation(expect: &Expectation, vars: &dyn VarSource) -> Result<Expectation, Failure> {
    let text = |subject: &str, value: &str| {
        template::resolve_str(value, vars).map_err(|e| Failure::resolve(format!("expected {}", subject), e))
    };

    let mut headers = BTreeMap::new();
    for (name, predicate) in &expect.headers {
        let resolved = match predicate {
            HeaderPredicate::Equals(value) => HeaderPredicate::Equals(text(name.as_str(), value)?),
            HeaderPredicate::Rules(rules) => HeaderPredicate::Rules(HeaderRules {
                equals: rules.equals.as_deref().map(|v| text(name.as_str(), v)).transpose()?,
                contains: rules.contains.as_deref().map(|v| text(name.as_str(), v)).transpose()?,
                ..rules.clone()
            }),
        };
        headers.insert(name.clone(), resolved);
    }

    let body = match &expect.body {
        None => None,
        Some(body) => {
            let subset = body
                .subset
                .as_ref()
                .map(|v| template::resolve_value(v, vars))
                .transpose()
                .map_err(|e| Failure::resolve("expected body", e))?;
            let mut pointers = BTreeMap::new();
            for (pointer, assertion) in &body.pointers {
                let equals = assertion
                    .equals
                    .as_ref()
                    .map(|v| template::resolve_value(v, vars))
                    .transpose()
                    .map_err(|e| Failure::resolve(format!("expected {}", pointer), e))?;
                pointers.insert(
                    pointer.clone(),
                    PointerAssertion {
                        equals,
                        ..assertion.clone()
                    },
                );
            }
            Some(BodyExpectation {
                subset,
                pointers,
                ..body.clone()
            })
        }
    };

    Ok(Expectation {
        status: expect.status,
        headers,
        body,
    })
}

/// Publish values from the response body; a missing pointer is a failure
fn capture(case: &CaseSpec, json: Option<&Value>, failures: &mut Vec<Failure>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (var, pointer) in &case.capture {
        match json.and_then(|j| j.pointer(pointer)) {
            Some(value) => {
                out.insert(var.clone(), value.clone());
            }
            None => failures.push(Failure::mismatch(
                FailureKind::Body,
                format!("capture {}", var),
                format!("value at {}", pointer),
                "<absent>",
                format!("could not capture '{}' from the response", var),
            )),
        }
    }
    out
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else if e.is_body() || e.is_decode() {
        format!("failed reading response body: {}", e)
    } else {
        e.to_string()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
