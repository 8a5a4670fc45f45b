use std::collections::BTreeMap;
use std::sync::Arc;

use alertline_protocol::rule::{Condition, Rule};
use alertline_protocol::variable::VariableDef;
use parking_lot::RwLock;

use crate::error::RuleError;

/// Registry of variables rule conditions may reference.
#[derive(Debug, Default, Clone)]
pub struct VariableCatalog {
    inner: Arc<RwLock<BTreeMap<String, VariableDef>>>,
}

impl VariableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog accepting the given keys with every aggregator.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let catalog = Self::new();
        for key in keys {
            catalog.register(VariableDef::new(key));
        }
        catalog
    }

    pub fn from_defs(defs: Vec<VariableDef>) -> Self {
        let catalog = Self::new();
        for def in defs {
            catalog.register(def);
        }
        catalog
    }

    /// Adds or replaces a definition.
    pub fn register(&self, def: VariableDef) {
        self.inner.write().insert(def.key.clone(), def);
    }

    pub fn get(&self, key: &str) -> Option<VariableDef> {
        self.inner.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn list(&self) -> Vec<VariableDef> {
        self.inner.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn validate_condition(&self, condition: &Condition) -> Result<(), RuleError> {
        let inner = self.inner.read();
        let def = inner
            .get(&condition.var)
            .ok_or_else(|| RuleError::UnknownVariable {
                var: condition.var.clone(),
            })?;
        if !def.allows(condition.agg) {
            return Err(RuleError::AggregatorNotAllowed {
                var: condition.var.clone(),
                agg: condition.agg,
            });
        }
        Ok(())
    }

    /// Checks every leaf of the rule, stopping at the first problem.
    pub fn validate_rule(&self, rule: &Rule) -> Result<(), RuleError> {
        rule.logic
            .conditions()
            .into_iter()
            .try_for_each(|condition| self.validate_condition(condition))
    }
}
