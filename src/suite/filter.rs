//! Tag-based case selection
//!
//! With no tags every case is selected. With tags, a case is selected when
//! it carries any of them; untagged cases only join when
//! `include_untagged` is set. Whatever the tags say, the dependencies of a
//! selected case are always pulled in so its placeholders can resolve.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::config::CaseSpec;

/// Selection criteria from the command line
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    pub tags: Vec<String>,
    pub include_untagged: bool,
}

impl TagFilter {
    pub fn new(tags: Vec<String>, include_untagged: bool) -> Self {
        Self {
            tags,
            include_untagged,
        }
    }

    /// Whether `case` matches on its own, ignoring dependencies
    pub fn matches(&self, case: &CaseSpec) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        if case.tags.is_empty() {
            return self.include_untagged;
        }
        self.tags.iter().any(|tag| case.has_tag(tag))
    }

    /// Select matching cases plus their transitive dependencies, keeping
    /// declared order
    pub fn select(&self, cases: &[Arc<CaseSpec>]) -> Vec<Arc<CaseSpec>> {
        let index: HashMap<&str, usize> = cases
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), i))
            .collect();

        let mut keep: HashSet<usize> = HashSet::new();
        let mut pending: Vec<usize> = cases
            .iter()
            .enumerate()
            .filter(|(_, c)| self.matches(c))
            .map(|(i, _)| i)
            .collect();

        while let Some(i) = pending.pop() {
            if !keep.insert(i) {
                continue;
            }
            for dep in &cases[i].depends_on {
                if let Some(&j) = index.get(dep.as_str()) {
                    if !keep.contains(&j) {
                        tracing::debug!("Selecting '{}' as a dependency of '{}'", dep, cases[i].name);
                        pending.push(j);
                    }
                }
            }
        }

        cases
            .iter()
            .enumerate()
            .filter(|(i, _)| keep.contains(i))
            .map(|(_, c)| Arc::clone(c))
            .collect()
    }

    /// Human-readable description for messages
    pub fn describe(&self) -> String {
        if self.tags.is_empty() {
            "(all cases)".to_string()
        } else if self.include_untagged {
            format!("{:?} + untagged", self.tags)
        } else {
            format!("{:?}", self.tags)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::config::Method;

    fn cases() -> Vec<Arc<CaseSpec>> {
        vec![
            Arc::new(CaseSpec::new("list", Method::Get, "todos", 200).capture("firstId", "/todos/0/id")),
            Arc::new(CaseSpec::new("challenges", Method::Get, "challenges", 200).tag("@API")),
            Arc::new(
                CaseSpec::new("get first", Method::Get, "todos/{{firstId}}", 200)
                    .tag("@API")
                    .depends_on("list"),
            ),
            Arc::new(CaseSpec::new("delete", Method::Delete, "todos/9", 200)),
            Arc::new(CaseSpec::new("smoke", Method::Head, "todos", 200).tag("smoke")),
        ]
    }

    fn names(selected: &[Arc<CaseSpec>]) -> Vec<&str> {
        selected.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_no_tags_selects_everything() {
        let all = cases();
        assert_eq!(TagFilter::default().select(&all).len(), all.len());
    }

    #[test]
    fn test_tag_pulls_in_untagged_dependency_in_order() {
        let selected = TagFilter::new(vec!["@API".to_string()], false).select(&cases());
        assert_eq!(names(&selected), vec!["list", "challenges", "get first"]);
    }

    #[test]
    fn test_tag_match_ignores_at_sign_and_case() {
        let selected = TagFilter::new(vec!["api".to_string()], false).select(&cases());
        assert_eq!(names(&selected), vec!["list", "challenges", "get first"]);
    }

    #[test]
    fn test_include_untagged() {
        let selected = TagFilter::new(vec!["smoke".to_string()], true).select(&cases());
        assert_eq!(names(&selected), vec!["list", "delete", "smoke"]);
    }

    #[test]
    fn test_unmatched_tag_selects_nothing() {
        let selected = TagFilter::new(vec!["@nightly".to_string()], false).select(&cases());
        assert!(selected.is_empty());
    }
}
