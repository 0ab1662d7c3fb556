//! Response assertions
//!
//! Every predicate is evaluated, and each one that does not hold adds its
//! own [`Failure`]. Nothing short-circuits, so one execution reports every
//! contract violation at once.

use regex::Regex;
use serde_json::{Number, Value};
use std::collections::BTreeMap;

use crate::common::truncate_display;
use crate::session::Session;
use crate::suite::{BodyExpectation, Expectation, HeaderPredicate, HeaderRules, PointerAssertion};

use super::result::{Failure, FailureKind};

/// Longest value rendered into a failure message
const MAX_DISPLAY: usize = 120;

/// What came back from the service
pub struct Observed<'a> {
    pub status: u16,
    /// Lower-cased header names
    pub headers: &'a BTreeMap<String, String>,
    pub raw_body: &'a str,
    /// Parsed body, when it is JSON
    pub json: Option<&'a Value>,
}

/// Evaluate an already-resolved expectation against a response
pub fn check(
    expect: &Expectation,
    observed: &Observed<'_>,
    session: &Session,
    request_body: Option<&Value>,
) -> Vec<Failure> {
    let mut failures = Vec::new();

    if observed.status != expect.status {
        failures.push(Failure::mismatch(
            FailureKind::Status,
            "status",
            expect.status.to_string(),
            observed.status.to_string(),
            format!("expected status {}, got {}", expect.status, observed.status),
        ));
    }

    for (name, predicate) in &expect.headers {
        check_header(name, predicate, observed, session, &mut failures);
    }

    if let Some(body) = &expect.body {
        check_body(body, observed, request_body, &mut failures);
    }

    failures
}

fn check_header(
    name: &str,
    predicate: &HeaderPredicate,
    observed: &Observed<'_>,
    session: &Session,
    failures: &mut Vec<Failure>,
) {
    let key = name.to_ascii_lowercase();
    let subject = format!("header {}", key);
    let actual = observed.headers.get(&key);

    let rules = match predicate {
        HeaderPredicate::Equals(value) => HeaderRules {
            equals: Some(value.clone()),
            ..Default::default()
        },
        HeaderPredicate::Rules(rules) => rules.clone(),
    };

    if let Some(false) = rules.present {
        if let Some(value) = actual {
            failures.push(Failure::mismatch(
                FailureKind::Header,
                &subject,
                "<absent>",
                value.as_str(),
                format!("header '{}' should be absent", key),
            ));
        }
        return;
    }

    let Some(actual) = actual else {
        let expected = describe_rules(&rules, session);
        failures.push(Failure::mismatch(
            FailureKind::Header,
            &subject,
            expected,
            "<absent>",
            format!("header '{}' is missing", key),
        ));
        return;
    };

    if let Some(expected) = &rules.equals {
        if actual != expected {
            failures.push(Failure::mismatch(
                FailureKind::Header,
                &subject,
                expected.as_str(),
                actual.as_str(),
                format!("header '{}' differs", key),
            ));
        }
    }

    if let Some(needle) = &rules.contains {
        if !actual.to_lowercase().contains(&needle.to_lowercase()) {
            failures.push(Failure::mismatch(
                FailureKind::Header,
                &subject,
                format!("contains '{}'", needle),
                actual.as_str(),
                format!("header '{}' does not contain '{}'", key, needle),
            ));
        }
    }

    if let Some(pattern) = &rules.matches {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(actual) => {}
            Ok(_) => failures.push(Failure::mismatch(
                FailureKind::Header,
                &subject,
                format!("matches /{}/", pattern),
                actual.as_str(),
                format!("header '{}' does not match /{}/", key, pattern),
            )),
            Err(e) => failures.push(Failure::new(
                FailureKind::Header,
                &subject,
                format!("invalid pattern /{}/: {}", pattern, e),
            )),
        }
    }

    if rules.session_token && actual != &session.token {
        failures.push(Failure::mismatch(
            FailureKind::Header,
            &subject,
            session.token.as_str(),
            actual.as_str(),
            format!("header '{}' does not echo the session token", key),
        ));
    }
}

fn describe_rules(rules: &HeaderRules, session: &Session) -> String {
    let mut parts = Vec::new();
    if let Some(v) = &rules.equals {
        parts.push(v.clone());
    }
    if let Some(v) = &rules.contains {
        parts.push(format!("contains '{}'", v));
    }
    if let Some(v) = &rules.matches {
        parts.push(format!("matches /{}/", v));
    }
    if rules.session_token {
        parts.push(session.token.clone());
    }
    if parts.is_empty() {
        "<present>".to_string()
    } else {
        parts.join(" and ")
    }
}

fn check_body(
    expect: &BodyExpectation,
    observed: &Observed<'_>,
    request_body: Option<&Value>,
    failures: &mut Vec<Failure>,
) {
    let needs_json = expect.json
        || expect.subset.is_some()
        || expect.matches_request
        || !expect.pointers.is_empty()
        || expect.custom.is_some();

    if let Some(needle) = &expect.contains {
        if !observed.raw_body.contains(needle.as_str()) {
            failures.push(Failure::mismatch(
                FailureKind::Body,
                "body",
                format!("contains '{}'", truncate_display(needle, MAX_DISPLAY)),
                truncate_display(observed.raw_body, MAX_DISPLAY),
                "body does not contain the expected text",
            ));
        }
    }

    let Some(json) = observed.json else {
        if needs_json {
            failures.push(Failure::mismatch(
                FailureKind::Body,
                "body",
                "JSON",
                truncate_display(observed.raw_body, MAX_DISPLAY),
                "body is not JSON",
            ));
        }
        return;
    };

    if let Some(subset) = &expect.subset {
        if let Some(path) = first_difference(subset, json, String::new()) {
            failures.push(Failure::mismatch(
                FailureKind::Body,
                format!("body{}", display_path(&path)),
                render(subset.pointer(&path).unwrap_or(subset)),
                render(json.pointer(&path).unwrap_or(&Value::Null)),
                "body does not contain the expected structure",
            ));
        }
    }

    if expect.matches_request {
        if let Some(sent) = request_body {
            if let Some(path) = first_difference(sent, json, String::new()) {
                failures.push(Failure::mismatch(
                    FailureKind::Body,
                    format!("body{}", display_path(&path)),
                    render(sent.pointer(&path).unwrap_or(sent)),
                    render(json.pointer(&path).unwrap_or(&Value::Null)),
                    "response does not echo the request body",
                ));
            }
        }
    }

    for (pointer, assertion) in &expect.pointers {
        check_pointer(pointer, assertion, json, failures);
    }

    if let Some(custom) = &expect.custom {
        if let Err(reason) = custom.check(json) {
            failures.push(Failure::new(
                FailureKind::Body,
                format!("predicate '{}'", custom.name),
                reason,
            ));
        }
    }
}

fn check_pointer(pointer: &str, assertion: &PointerAssertion, json: &Value, failures: &mut Vec<Failure>) {
    let subject = if pointer.is_empty() { "body" } else { pointer };
    let actual = json.pointer(pointer);

    match (assertion.exists, actual) {
        (Some(false), Some(value)) => {
            failures.push(Failure::mismatch(
                FailureKind::Body,
                subject,
                "<absent>",
                render(value),
                "value should not exist",
            ));
            return;
        }
        (Some(false), None) => return,
        (_, None) => {
            failures.push(Failure::mismatch(
                FailureKind::Body,
                subject,
                "<present>",
                "<absent>",
                "pointer does not resolve",
            ));
            return;
        }
        (_, Some(_)) => {}
    }
    let Some(actual) = actual else { return };

    if let Some(expected) = &assertion.equals {
        if !json_equal(expected, actual) {
            failures.push(Failure::mismatch(
                FailureKind::Body,
                subject,
                render(expected),
                render(actual),
                "value differs",
            ));
        }
    }

    if assertion.is_array && !actual.is_array() {
        failures.push(Failure::mismatch(
            FailureKind::Body,
            subject,
            "array",
            type_name(actual),
            "value is not an array",
        ));
    }

    let size = value_len(actual);
    if let Some(expected) = assertion.length {
        if size != Some(expected) {
            failures.push(Failure::mismatch(
                FailureKind::Body,
                subject,
                format!("length {}", expected),
                size.map(|n| format!("length {}", n))
                    .unwrap_or_else(|| type_name(actual).to_string()),
                "length differs",
            ));
        }
    }

    if assertion.not_empty && size.unwrap_or(0) == 0 {
        failures.push(Failure::mismatch(
            FailureKind::Body,
            subject,
            "non-empty",
            render(actual),
            "value is empty",
        ));
    }
}

/// Compare JSON values, treating numbers by numeric value (1 == 1.0)
///
/// Integers compare exactly; only a float on either side falls back to
/// `f64`, so ids beyond 2^53 are never conflated.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| json_equal(v, w)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if x.is_f64() || y.is_f64() {
        return match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        };
    }
    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => x == y,
        // At least one side is above i64::MAX
        _ => x.as_u64().is_some() && x.as_u64() == y.as_u64(),
    }
}

/// JSON pointer of the first place `actual` does not contain `expected`
///
/// Objects match when every expected key is present with a matching value;
/// extra keys in `actual` are ignored. Arrays must have equal length and
/// match element-wise. Scalars compare with [`json_equal`].
fn first_difference(expected: &Value, actual: &Value, path: String) -> Option<String> {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => exp.iter().find_map(|(key, value)| {
            let child = format!("{}/{}", path, escape_pointer(key));
            match act.get(key) {
                Some(found) => first_difference(value, found, child),
                None => Some(child),
            }
        }),
        (Value::Array(exp), Value::Array(act)) => {
            if exp.len() != act.len() {
                return Some(path);
            }
            exp.iter()
                .zip(act)
                .enumerate()
                .find_map(|(i, (e, a))| first_difference(e, a, format!("{}/{}", path, i)))
        }
        _ if json_equal(expected, actual) => None,
        _ => Some(path),
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn display_path(pointer: &str) -> String {
    if pointer.is_empty() {
        String::new()
    } else {
        format!(" at {}", pointer)
    }
}

fn value_len(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => Some(items.len()),
        Value::String(s) => Some(s.chars().count()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn render(value: &Value) -> String {
    truncate_display(&value.to_string(), MAX_DISPLAY)
}
