//! Values passed between case executions
//!
//! The context is the only state carried from one case to the next. It is
//! read by placeholder resolution and appended to after each case (or after
//! each concurrent batch, in declared order).

use serde_json::Value;
use std::collections::BTreeMap;

use crate::suite::template::VarSource;

#[derive(Debug, Default, Clone)]
pub struct RunContext {
    vars: BTreeMap<String, Value>,
    captures: BTreeMap<String, Value>,
}

impl RunContext {
    pub fn new(vars: BTreeMap<String, Value>) -> Self {
        Self {
            vars,
            captures: BTreeMap::new(),
        }
    }

    /// Publish values captured by a finished case; later captures win
    pub fn record(&mut self, captures: &BTreeMap<String, Value>) {
        for (name, value) in captures {
            self.captures.insert(name.clone(), value.clone());
        }
    }
}

impl VarSource for RunContext {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.captures.get(name).or_else(|| self.vars.get(name))
    }
}
