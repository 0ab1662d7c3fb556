//! Declarative test suites
//!
//! Loads YAML suite files into immutable [`CaseSpec`]s and checks, before
//! any request is sent, that every ordering dependency is explicit and
//! satisfiable.

mod config;
mod filter;
pub mod template;

pub use config::*;
pub use filter::TagFilter;

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::common::{Error, Result};
use template::{Placeholder, ResolveError};

/// One or more suite files, merged in load order
#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    pub description: Option<String>,
    pub vars: BTreeMap<String, Value>,
    pub cases: Vec<Arc<CaseSpec>>,
}

impl Suite {
    /// Load and validate a suite file
    pub fn load(path: &Path) -> Result<Self> {
        let suite = Self::read(path)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite file without validating it
    ///
    /// A file read this way may depend on cases from files merged before
    /// it, so validation is left to [`Suite::merge`].
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// Load several suite files as one ordered suite, validated once merged
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let suites = paths
            .iter()
            .map(|p| Self::read(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::merge(suites)
    }

    /// Parse and validate a suite from YAML text
    pub fn from_yaml(content: &str, origin: &str) -> Result<Self> {
        let suite = Self::parse_yaml(content, origin)?;
        suite.validate()?;
        Ok(suite)
    }

    fn parse_yaml(content: &str, origin: &str) -> Result<Self> {
        let file: SuiteFile = serde_yaml::from_str(content).map_err(|e| Error::SuiteParse {
            path: origin.to_string(),
            error: e.to_string(),
        })?;
        Ok(Self {
            name: file.name,
            description: file.description,
            vars: file.vars,
            cases: file.cases.into_iter().map(Arc::new).collect(),
        })
    }

    /// Build a suite from cases constructed in Rust
    pub fn from_cases(name: &str, vars: BTreeMap<String, Value>, cases: Vec<CaseSpec>) -> Result<Self> {
        let suite = Self {
            name: name.to_string(),
            description: None,
            vars,
            cases: cases.into_iter().map(Arc::new).collect(),
        };
        suite.validate()?;
        Ok(suite)
    }

    /// Concatenate suites and validate the result; later suites see
    /// earlier suites' cases as possible dependencies
    pub fn merge(suites: Vec<Suite>) -> Result<Self> {
        let mut iter = suites.into_iter();
        let mut merged = iter
            .next()
            .ok_or_else(|| Error::Config("No suite files given".to_string()))?;

        for suite in iter {
            merged.name = format!("{}, {}", merged.name, suite.name);
            for (key, value) in suite.vars {
                if let Some(previous) = merged.vars.get(&key) {
                    if previous != &value {
                        return Err(Error::Config(format!(
                            "Variable '{}' is defined differently in suite '{}'",
                            key, suite.name
                        )));
                    }
                }
                merged.vars.insert(key, value);
            }
            merged.cases.extend(suite.cases);
        }

        merged.validate()?;
        Ok(merged)
    }

    /// Cases chosen by `filter`, in declared order
    ///
    /// Selecting nothing is an error rather than a vacuous success.
    pub fn select(&self, filter: &TagFilter) -> Result<Vec<Arc<CaseSpec>>> {
        let selected = filter.select(&self.cases);
        if selected.is_empty() {
            return Err(Error::NoCasesSelected {
                filter: filter.describe(),
            });
        }
        Ok(selected)
    }

    /// Check names, dependency edges, placeholder sources and predicates
    pub fn validate(&self) -> Result<()> {
        // Variables produced by each case, for placeholder source checks
        let mut produced: HashMap<&str, HashSet<&str>> = HashMap::new();
        // Transitive dependencies of each case seen so far
        let mut ancestors: HashMap<&str, HashSet<&str>> = HashMap::new();

        for case in &self.cases {
            let name = case.name.as_str();
            if name.trim().is_empty() {
                return Err(Error::Config("Case name must not be empty".to_string()));
            }
            if produced.contains_key(name) {
                return Err(Error::DuplicateCase(name.to_string()));
            }

            let mut deps: HashSet<&str> = HashSet::new();
            for dep in &case.depends_on {
                // Only earlier cases are known at this point, which also
                // rejects self and forward references
                let Some(dep_ancestors) = ancestors.get(dep.as_str()) else {
                    return Err(Error::unknown_dependency(name, dep));
                };
                deps.insert(dep.as_str());
                deps.extend(dep_ancestors.iter().copied());
            }

            if case.independent && !case.depends_on.is_empty() {
                return Err(Error::Config(format!(
                    "Case '{}' is marked independent but declares depends_on",
                    name
                )));
            }

            for var in referenced_vars(case)? {
                if self.vars.contains_key(&var) {
                    continue;
                }
                let from_dependency = deps
                    .iter()
                    .any(|d| produced.get(d).is_some_and(|vars| vars.contains(var.as_str())));
                if !from_dependency {
                    let hint = if case.independent {
                        "independent cases may only use suite vars"
                    } else {
                        "declare the producing case in depends_on or add it to vars"
                    };
                    return Err(Error::Config(format!(
                        "Case '{}' uses '{{{{{}}}}}' which no suite var or dependency provides ({})",
                        name, var, hint
                    )));
                }
            }

            validate_expectation(case)?;

            for pointer in case.capture.values() {
                check_pointer(name, pointer)?;
            }
            if case.expect.status < 100 || case.expect.status > 599 {
                return Err(Error::Config(format!(
                    "Case '{}' expects invalid status {}",
                    name, case.expect.status
                )));
            }

            produced.insert(name, case.capture.keys().map(String::as_str).collect());
            ancestors.insert(name, deps);
        }
        Ok(())
    }
}

/// Names of all `{{var}}` placeholders used by a case's request
fn referenced_vars(case: &CaseSpec) -> Result<Vec<String>> {
    let wrap = |e: ResolveError| Error::Config(format!("Case '{}': {}", case.name, e));

    let mut found = template::placeholders(&case.path).map_err(wrap)?;
    for value in case.headers.values() {
        found.extend(template::placeholders(value).map_err(wrap)?);
    }
    for value in case.query.values() {
        found.extend(template::value_placeholders(value).map_err(wrap)?);
    }
    if let Some(body) = &case.body {
        found.extend(template::value_placeholders(body).map_err(wrap)?);
    }

    // Expected values may refer to the same variables as the request
    for predicate in case.expect.headers.values() {
        match predicate {
            HeaderPredicate::Equals(value) => {
                found.extend(template::placeholders(value).map_err(wrap)?)
            }
            HeaderPredicate::Rules(rules) => {
                for value in [&rules.equals, &rules.contains].into_iter().flatten() {
                    found.extend(template::placeholders(value).map_err(wrap)?);
                }
            }
        }
    }
    if let Some(body) = &case.expect.body {
        if let Some(subset) = &body.subset {
            found.extend(template::value_placeholders(subset).map_err(wrap)?);
        }
        for assertion in body.pointers.values() {
            if let Some(expected) = &assertion.equals {
                found.extend(template::value_placeholders(expected).map_err(wrap)?);
            }
        }
    }

    Ok(found
        .into_iter()
        .filter_map(|p| match p {
            Placeholder::Var(name) => Some(name),
            Placeholder::Repeat { .. } => None,
        })
        .collect())
}

fn validate_expectation(case: &CaseSpec) -> Result<()> {
    for (header, predicate) in &case.expect.headers {
        if let HeaderPredicate::Rules(rules) = predicate {
            if let Some(pattern) = &rules.matches {
                regex::Regex::new(pattern).map_err(|e| {
                    Error::Config(format!(
                        "Case '{}': invalid regex for header '{}': {}",
                        case.name, header, e
                    ))
                })?;
            }
        }
    }
    if let Some(body) = &case.expect.body {
        for pointer in body.pointers.keys() {
            check_pointer(&case.name, pointer)?;
        }
        if body.matches_request && case.body.is_none() {
            return Err(Error::Config(format!(
                "Case '{}' uses matches_request without a request body",
                case.name
            )));
        }
    }
    Ok(())
}

fn check_pointer(case: &str, pointer: &str) -> Result<()> {
    if pointer.is_empty() || pointer.starts_with('/') {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Case '{}': '{}' is not a JSON pointer (must start with '/')",
            case, pointer
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
name: todos
vars:
  missingId: 9999999
cases:
  - name: list todos
    method: GET
    path: todos
    tags: ["@API"]
    capture:
      firstId: /todos/0/id
    expect:
      status: 200
  - name: get first todo
    method: GET
    path: "todos/{{firstId}}"
    depends_on: [list todos]
    tags: ["@API"]
    expect:
      status: 200
      body:
        pointers:
          /todos/0/id: { equals: "{{firstId}}" }
  - name: missing todo
    method: GET
    path: "todos/{{missingId}}"
    independent: true
    expect:
      status: 404
"#;

    #[test]
    fn test_loads_valid_suite() {
        let suite = Suite::from_yaml(SUITE, "inline").unwrap();
        assert_eq!(suite.cases.len(), 3);
        assert_eq!(suite.vars["missingId"], serde_json::json!(9999999));
    }

    #[test]
    fn test_forward_dependency_is_rejected() {
        let yaml = r#"
name: bad
cases:
  - name: a
    method: GET
    path: "todos/{{id}}"
    depends_on: [b]
    expect: { status: 200 }
  - name: b
    method: GET
    path: todos
    capture: { id: /todos/0/id }
    expect: { status: 200 }
"#;
        assert!(matches!(
            Suite::from_yaml(yaml, "inline"),
            Err(Error::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_capture_without_depends_on_is_rejected() {
        let yaml = r#"
name: bad
cases:
  - name: a
    method: GET
    path: todos
    capture: { id: /todos/0/id }
    expect: { status: 200 }
  - name: b
    method: GET
    path: "todos/{{id}}"
    expect: { status: 200 }
"#;
        let err = Suite::from_yaml(yaml, "inline").unwrap_err();
        assert!(err.to_string().contains("{{id}}"), "got: {err}");
    }

    #[test]
    fn test_transitive_capture_is_allowed() {
        let cases = vec![
            CaseSpec::new("a", Method::Get, "todos", 200).capture("id", "/todos/0/id"),
            CaseSpec::new("b", Method::Get, "todos/{{id}}", 200).depends_on("a"),
            CaseSpec::new("c", Method::Delete, "todos/{{id}}", 200).depends_on("b"),
        ];
        assert!(Suite::from_cases("t", BTreeMap::new(), cases).is_ok());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let cases = vec![
            CaseSpec::new("a", Method::Get, "todos", 200),
            CaseSpec::new("a", Method::Head, "todos", 200),
        ];
        assert!(matches!(
            Suite::from_cases("t", BTreeMap::new(), cases),
            Err(Error::DuplicateCase(_))
        ));
    }

    #[test]
    fn test_independent_case_cannot_depend() {
        let cases = vec![
            CaseSpec::new("a", Method::Get, "todos", 200),
            CaseSpec::new("b", Method::Get, "todos", 200).depends_on("a").independent(),
        ];
        assert!(matches!(
            Suite::from_cases("t", BTreeMap::new(), cases),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_invalid_header_regex_is_rejected() {
        let case = CaseSpec::new("a", Method::Get, "todos", 200).expect_header(
            "content-type",
            HeaderPredicate::Rules(HeaderRules {
                matches: Some("(json".to_string()),
                ..Default::default()
            }),
        );
        assert!(Suite::from_cases("t", BTreeMap::new(), vec![case]).is_err());
    }

    #[test]
    fn test_select_reports_empty_selection() {
        let suite = Suite::from_yaml(SUITE, "inline").unwrap();
        let filter = TagFilter::new(vec!["@nightly".to_string()], false);
        assert!(matches!(
            suite.select(&filter),
            Err(Error::NoCasesSelected { .. })
        ));
        let api = suite
            .select(&TagFilter::new(vec!["@API".to_string()], false))
            .unwrap();
        assert_eq!(api.len(), 2);
    }

    #[test]
    fn test_merge_detects_conflicting_vars() {
        let a = Suite::from_yaml("name: a\nvars: { id: 1 }\ncases: []\n", "a").unwrap();
        let b = Suite::from_yaml("name: b\nvars: { id: 2 }\ncases: []\n", "b").unwrap();
        assert!(Suite::merge(vec![a, b]).is_err());
    }

    #[test]
    fn test_later_file_may_depend_on_earlier_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.yaml");
        let second = dir.path().join("b.yaml");
        std::fs::write(
            &first,
            "name: a\ncases:\n  - name: list\n    method: GET\n    path: todos\n    capture: { id: /todos/0/id }\n    expect: { status: 200 }\n",
        )
        .unwrap();
        std::fs::write(
            &second,
            "name: b\ncases:\n  - name: fetch\n    method: GET\n    path: \"todos/{{id}}\"\n    depends_on: [list]\n    expect: { status: 200 }\n",
        )
        .unwrap();

        let suite = Suite::load_all(&[&first, &second]).unwrap();
        let names: Vec<&str> = suite.cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["list", "fetch"]);
        assert_eq!(suite.name, "a, b");

        // The second file alone still cannot stand on its own
        assert!(Suite::read(&second).is_ok());
        assert!(matches!(Suite::load(&second), Err(Error::UnknownDependency { .. })));
        // Nor may the order be reversed
        assert!(Suite::load_all(&[&second, &first]).is_err());
    }

    #[test]
    fn test_misspelled_keys_are_rejected() {
        for yaml in [
            "name: t\ncases:\n  - name: a\n    method: GET\n    path: todos\n    expect: { status: 200, header: { content-type: json } }\n",
            "name: t\ncases:\n  - name: a\n    method: GET\n    path: todos\n    depend_on: [b]\n    expect: { status: 200 }\n",
            "name: t\ncases:\n  - name: a\n    method: GET\n    path: todos\n    captures: { id: /id }\n    expect: { status: 200 }\n",
            "name: t\nvariables: { id: 1 }\ncases: []\n",
        ] {
            assert!(
                matches!(Suite::from_yaml(yaml, "inline"), Err(Error::SuiteParse { .. })),
                "accepted: {yaml}"
            );
        }
    }
}
