//! Placeholder resolution
//!
//! Two forms are recognised inside `{{ }}`:
//! - `{{name}}`: a suite variable or a value captured by an earlier case
//! - `{{repeat:<text>:<count>}}`: `<text>` repeated `<count>` times
//!
//! A JSON string consisting of exactly one variable placeholder is replaced
//! by the variable's value with its type intact, so `"{{todoId}}"` can
//! become the number `7`.

use serde_json::Value;
use thiserror::Error;

/// Source of variable values during resolution
pub trait VarSource {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl VarSource for std::collections::BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown placeholder '{{{{{0}}}}}'")]
    Unknown(String),

    #[error("unterminated placeholder in '{0}'")]
    Unterminated(String),

    #[error("invalid generator '{0}', expected repeat:<text>:<count>")]
    InvalidGenerator(String),
}

/// A parsed placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Var(String),
    Repeat { text: String, count: usize },
}

/// Upper bound for generated text, far above any realistic payload test
const MAX_REPEAT_CHARS: usize = 10 * 1024 * 1024;

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(Placeholder),
}

fn parse_placeholder(inner: &str) -> Result<Placeholder, ResolveError> {
    let inner = inner.trim();
    if let Some(spec) = inner.strip_prefix("repeat:") {
        let (text, count) = spec
            .rsplit_once(':')
            .ok_or_else(|| ResolveError::InvalidGenerator(inner.to_string()))?;
        let count: usize = count
            .trim()
            .parse()
            .map_err(|_| ResolveError::InvalidGenerator(inner.to_string()))?;
        if text.is_empty() || text.len().saturating_mul(count) > MAX_REPEAT_CHARS {
            return Err(ResolveError::InvalidGenerator(inner.to_string()));
        }
        return Ok(Placeholder::Repeat {
            text: text.to_string(),
            count,
        });
    }
    if inner.is_empty() {
        return Err(ResolveError::Unknown(String::new()));
    }
    Ok(Placeholder::Var(inner.to_string()))
}

fn segments(input: &str) -> Result<Vec<Segment<'_>>, ResolveError> {
    let mut out = Vec::new();
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        if start > 0 {
            out.push(Segment::Literal(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| ResolveError::Unterminated(input.to_string()))?;
        out.push(Segment::Placeholder(parse_placeholder(&after[..end])?));
        rest = &after[end + 2..];
    }
    if !rest.is_empty() {
        out.push(Segment::Literal(rest));
    }
    Ok(out)
}

/// All placeholders in `input`, in order of appearance
pub fn placeholders(input: &str) -> Result<Vec<Placeholder>, ResolveError> {
    Ok(segments(input)?
        .into_iter()
        .filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// All placeholders in string leaves of a JSON value
pub fn value_placeholders(value: &Value) -> Result<Vec<Placeholder>, ResolveError> {
    let mut out = Vec::new();
    collect_value_placeholders(value, &mut out)?;
    Ok(out)
}

fn collect_value_placeholders(value: &Value, out: &mut Vec<Placeholder>) -> Result<(), ResolveError> {
    match value {
        Value::String(s) => out.extend(placeholders(s)?),
        Value::Array(items) => {
            for item in items {
                collect_value_placeholders(item, out)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_value_placeholders(item, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Render a JSON value as text for interpolation
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Resolve every placeholder in `input` to text
pub fn resolve_str(input: &str, vars: &dyn VarSource) -> Result<String, ResolveError> {
    let mut out = String::with_capacity(input.len());
    for segment in segments(input)? {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(Placeholder::Var(name)) => {
                let value = vars.lookup(&name).ok_or(ResolveError::Unknown(name))?;
                out.push_str(&value_to_text(value));
            }
            Segment::Placeholder(Placeholder::Repeat { text, count }) => {
                out.push_str(&text.repeat(count));
            }
        }
    }
    Ok(out)
}

/// Resolve placeholders in every string leaf of a JSON value
pub fn resolve_value(value: &Value, vars: &dyn VarSource) -> Result<Value, ResolveError> {
    match value {
        Value::String(s) => {
            if let [Segment::Placeholder(Placeholder::Var(name))] = segments(s)?.as_slice() {
                return vars
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| ResolveError::Unknown(name.clone()));
            }
            Ok(Value::String(resolve_str(s, vars)?))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, vars))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), resolve_value(item, vars)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}
