//! Suite file data model
//!
//! Defines the data structures for deserializing YAML suites. Every type
//! here is plain data; the only executable part is the optional
//! [`CustomPredicate`] an author can attach when building cases in Rust.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A suite as written in a YAML file
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    /// Name of the suite
    pub name: String,
    /// Optional description of what the suite verifies
    pub description: Option<String>,
    /// Constants available to every case as `{{name}}`
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
    /// Cases in execution order
    pub cases: Vec<CaseSpec>,
}

/// HTTP methods a case may use
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request/assertion scenario
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct CaseSpec {
    /// Unique name, also used by `depends_on`
    pub name: String,
    /// Optional longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub method: Method,
    /// Path relative to the base URL; may contain placeholders
    pub path: String,
    /// Query parameters; scalar values are sent as text
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, Value>,
    /// Request headers; the session header is attached on top of these
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// JSON request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// What the response must look like
    pub expect: Expectation,
    /// Selection tags (e.g. "@API")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Earlier cases whose captures this case reads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Values to publish from the response body: variable -> JSON pointer
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capture: BTreeMap<String, String>,
    /// May run concurrently with neighbouring independent cases
    #[serde(default)]
    pub independent: bool,
    /// Per-case request timeout, overriding the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Expected response
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    /// Exact status code
    pub status: u16,
    /// Header name (case-insensitive) -> predicate
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, HeaderPredicate>,
    /// Body predicate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyExpectation>,
}

/// Predicate on a single response header
///
/// A bare string is shorthand for `{ equals: ... }`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum HeaderPredicate {
    Equals(String),
    Rules(HeaderRules),
}

/// Header rules; every rule that is set is checked independently
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeaderRules {
    /// Exact value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    /// Substring of the value (case-insensitive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    /// Regular expression the value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
    /// Whether the header must be present (true) or absent (false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present: Option<bool>,
    /// Value must equal the run's session token
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub session_token: bool,
}

/// Predicate on the response body
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct BodyExpectation {
    /// Body must parse as JSON
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub json: bool,
    /// Raw body must contain this text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    /// Body must contain this JSON structure (objects compared as subsets)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<Value>,
    /// The resolved request body must be a subset of the response body
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub matches_request: bool,
    /// JSON pointer -> assertion
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pointers: BTreeMap<String, PointerAssertion>,
    /// Author-supplied check, only available from Rust
    #[serde(skip)]
    pub custom: Option<CustomPredicate>,
}

/// Assertion on the value at a JSON pointer
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PointerAssertion {
    /// Exact value (numbers compared numerically)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
    /// Array length, string length in chars, or object size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    /// Array, string or object must be non-empty
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not_empty: bool,
    /// Value must be an array
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_array: bool,
    /// Whether the pointer must resolve (default: must exist)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

type PredicateFn = dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync;

/// Named body check written in Rust
#[derive(Clone)]
pub struct CustomPredicate {
    pub name: String,
    check: Arc<PredicateFn>,
}

impl CustomPredicate {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn check(&self, body: &Value) -> std::result::Result<(), String> {
        (self.check)(body)
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CaseSpec {
    /// Start building a case in Rust
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>, status: u16) -> Self {
        Self {
            name: name.into(),
            description: None,
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            expect: Expectation {
                status,
                headers: BTreeMap::new(),
                body: None,
            },
            tags: Vec::new(),
            depends_on: Vec::new(),
            capture: BTreeMap::new(),
            independent: false,
            timeout_secs: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn query(mut self, name: &str, value: Value) -> Self {
        self.query.insert(name.to_string(), value);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn depends_on(mut self, case: &str) -> Self {
        self.depends_on.push(case.to_string());
        self
    }

    pub fn capture(mut self, var: &str, pointer: &str) -> Self {
        self.capture.insert(var.to_string(), pointer.to_string());
        self
    }

    pub fn independent(mut self) -> Self {
        self.independent = true;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn expect_header(mut self, name: &str, predicate: HeaderPredicate) -> Self {
        self.expect.headers.insert(name.to_string(), predicate);
        self
    }

    pub fn expect_body(mut self, body: BodyExpectation) -> Self {
        self.expect.body = Some(body);
        self
    }

    /// Attach a Rust predicate to the body expectation
    pub fn expect_body_fn<F>(mut self, name: &str, check: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        let body = self.expect.body.get_or_insert_with(BodyExpectation::default);
        body.custom = Some(CustomPredicate::new(name, check));
        self
    }

    /// Whether the case carries `tag`, ignoring a leading '@' and ASCII case
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = normalize_tag(tag);
        self.tags.iter().any(|t| normalize_tag(t) == wanted)
    }
}

pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('@').to_ascii_lowercase()
}
