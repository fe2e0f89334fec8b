//! Action Parameters
//!
//! Named JSON values chosen by the decision oracle for an action.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ActionError;

/// Parameters for one action invocation, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionParams(BTreeMap<String, Value>);

impl ActionParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required string parameter.
    pub fn str(&self, key: &str) -> Result<&str, ActionError> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(ActionError::invalid_param(key, format!("expected string, got {}", other))),
            None => Err(ActionError::invalid_param(key, "missing")),
        }
    }

    /// Optional integer parameter. Accepts numeric strings.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
