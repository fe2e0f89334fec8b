//! Action Registry
//!
//! Maps the stable name chosen by the decision oracle to a factory for the
//! concrete action. Built once at startup and shared read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use super::action::{Action, Temporal};
use super::cooldown::Cooldown;
use crate::error::RegistryError;
use crate::oracle::ActionChoice;

/// Builds a fresh, unstarted action.
pub type ActionFactory = Arc<dyn Fn() -> Box<dyn Action> + Send + Sync>;

/// Static description of an action type, supplied at registration.
#[derive(Clone)]
pub struct ActionDescriptor {
    pub name: String,
    /// Human-readable description advertised to the oracle
    pub summary: String,
    pub temporal: Temporal,
    /// Minimum months between completions per agent; 0 disables
    pub cooldown_months: u64,
    /// Parameter names the action reads
    pub params: Vec<String>,
    /// `None` for abstract bases
    pub factory: Option<ActionFactory>,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>, summary: impl Into<String>, temporal: Temporal) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            temporal,
            cooldown_months: 0,
            params: Vec::new(),
            factory: None,
        }
    }

    pub fn with_cooldown(mut self, months: u64) -> Self {
        self.cooldown_months = months;
        self
    }

    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Action> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Summary as shown to the oracle, including any cooldown.
    pub fn advertised_summary(&self) -> String {
        if self.cooldown_months > 0 {
            format!("{} (cooldown: {} months)", self.summary, self.cooldown_months)
        } else {
            self.summary.clone()
        }
    }
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("temporal", &self.temporal)
            .field("cooldown_months", &self.cooldown_months)
            .field("params", &self.params)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct Entry {
    descriptor: ActionDescriptor,
    actual: bool,
}

/// Name to action-type table.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    entries: Vec<Entry>,
    /// Lowercased name to index into `entries`
    index: HashMap<String, usize>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action type. `actual = false` marks an abstract base that
    /// is never instantiated from a plan nor advertised.
    pub fn register(&mut self, descriptor: ActionDescriptor, actual: bool) -> Result<(), RegistryError> {
        let key = descriptor.name.to_lowercase();
        if self.index.contains_key(&key) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }
        // Without a factory there is nothing to instantiate
        let actual = actual && descriptor.factory.is_some();
        self.index.insert(key, self.entries.len());
        self.entries.push(Entry { descriptor, actual });
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<&Entry, RegistryError> {
        self.index
            .get(&name.trim().to_lowercase())
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Looks up a descriptor by name, case-insensitively.
    pub fn get(&self, name: &str) -> Result<&ActionDescriptor, RegistryError> {
        self.entry(name).map(|e| &e.descriptor)
    }

    pub fn is_actual(&self, name: &str) -> bool {
        self.entry(name).map(|e| e.actual).unwrap_or(false)
    }

    /// Every executable action, in registration order.
    pub fn all_actual(&self) -> Vec<&ActionDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.actual)
            .map(|e| &e.descriptor)
            .collect()
    }

    /// The legal action space as advertised to the oracle.
    pub fn choices(&self) -> Vec<ActionChoice> {
        self.all_actual()
            .into_iter()
            .map(|d| ActionChoice {
                name: d.name.clone(),
                summary: d.advertised_summary(),
                params: d.params.clone(),
            })
            .collect()
    }

    /// Builds a new instance, wrapped with its cooldown when configured.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Action>, RegistryError> {
        let entry = self.entry(name)?;
        let factory = match (&entry.descriptor.factory, entry.actual) {
            (Some(factory), true) => factory,
            _ => return Err(RegistryError::Abstract(entry.descriptor.name.clone())),
        };
        Ok(Cooldown::wrap(factory(), entry.descriptor.cooldown_months))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
