use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use alertline_protocol::audit::{Actor, AuditAction, AuditRecord};
use alertline_protocol::rule::{Rule, RulePatch};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::error::RuleError;
use crate::validation::validate_structure;

/// Versioned history entry for a stored rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleHistoryEntry {
    pub version: u32,
    pub rule: Rule,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl RuleHistoryEntry {
    fn new(rule: Rule, actor: &Actor) -> Self {
        Self {
            version: rule.version,
            rule,
            created_at: Utc::now(),
            updated_by: Some(actor.user.clone()),
        }
    }
}

/// Optional filters for [`RuleCatalog::list`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleFilter {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub category: Option<String>,
}

impl RuleFilter {
    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            category: None,
        }
    }

    fn matches(&self, rule: &Rule) -> bool {
        self.enabled.map_or(true, |enabled| rule.enabled == enabled)
            && self
                .category
                .as_ref()
                .map_or(true, |category| &rule.category == category)
    }
}

/// Normalizes a rule id: lowercase, spaces and unsupported characters become
/// `_`, runs of `_` collapse and leading/trailing `_` are dropped.
pub fn slugify_id(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for ch in raw.trim().to_lowercase().chars() {
        let ch = if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' {
            ch
        } else {
            '_'
        };
        if ch == '_' && slug.ends_with('_') {
            continue;
        }
        slug.push(ch);
    }
    slug.trim_matches('_').to_string()
}

fn normalized_id(raw: &str) -> String {
    let slug = slugify_id(raw);
    if slug.is_empty() {
        format!("rule-{}", Uuid::new_v4())
    } else {
        slug
    }
}

fn snapshot_of(rule: &Rule) -> Option<Value> {
    serde_json::to_value(rule).ok()
}

/// Multi-tenant rule catalog with version tracking. Every mutation is
/// validated and recorded through the audit sink.
#[derive(Clone)]
pub struct RuleCatalog {
    inner: Arc<RwLock<HashMap<String, Vec<RuleHistoryEntry>>>>,
    audit: Arc<dyn AuditSink>,
}

impl RuleCatalog {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            audit,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn tenants(&self) -> BTreeSet<String> {
        self.inner
            .read()
            .values()
            .filter_map(|versions| versions.last())
            .map(|entry| entry.rule.tenant_id.clone())
            .collect()
    }

    /// Latest version of every rule of the tenant passing the filter,
    /// ordered by descending priority, then ascending id.
    pub fn list(&self, tenant_id: &str, filter: &RuleFilter) -> Vec<Rule> {
        let inner = self.inner.read();
        let mut rules: Vec<Rule> = inner
            .values()
            .filter_map(|versions| versions.last())
            .map(|entry| &entry.rule)
            .filter(|rule| rule.tenant_id == tenant_id && filter.matches(rule))
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        rules
    }

    /// Rules the engine evaluates for the tenant, in evaluation order.
    pub fn enabled_rules(&self, tenant_id: &str) -> Vec<Rule> {
        self.list(tenant_id, &RuleFilter::enabled())
    }

    /// Every rule across tenants, ordered by id.
    pub fn all(&self) -> Vec<Rule> {
        let inner = self.inner.read();
        let mut rules: Vec<Rule> = inner
            .values()
            .filter_map(|versions| versions.last())
            .map(|entry| entry.rule.clone())
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    pub fn get(&self, rule_id: &str) -> Option<Rule> {
        self.inner
            .read()
            .get(rule_id)
            .and_then(|versions| versions.last())
            .map(|entry| entry.rule.clone())
    }

    pub fn history(&self, rule_id: &str) -> Vec<RuleHistoryEntry> {
        self.inner
            .read()
            .get(rule_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Stores a new rule under its normalized id at version 1.
    pub fn create(&self, mut rule: Rule, actor: &Actor) -> Result<Rule, RuleError> {
        rule.id = normalized_id(&rule.id);
        rule.version = 1;
        validate_structure(&rule)?;

        let mut inner = self.inner.write();
        if inner.contains_key(&rule.id) {
            return Err(RuleError::AlreadyExists(rule.id));
        }
        inner.insert(
            rule.id.clone(),
            vec![RuleHistoryEntry::new(rule.clone(), actor)],
        );
        self.audit.append(AuditRecord::rule(
            actor,
            AuditAction::Create,
            &rule.id,
            None,
            snapshot_of(&rule),
        ));
        info!(rule_id = %rule.id, tenant_id = %rule.tenant_id, "rule created");
        Ok(rule)
    }

    /// Replaces the whole rule. The id cannot change.
    pub fn replace(&self, rule_id: &str, rule: Rule, actor: &Actor) -> Result<Rule, RuleError> {
        if rule.id != rule_id {
            return Err(RuleError::IdMismatch {
                expected: rule_id.to_string(),
                actual: rule.id,
            });
        }
        self.update(rule_id, actor, AuditAction::Update, |_| Ok(rule))
    }

    /// Applies the named sub-fields of `patch` to the current version.
    pub fn patch(&self, rule_id: &str, patch: &RulePatch, actor: &Actor) -> Result<Rule, RuleError> {
        self.update(rule_id, actor, AuditAction::Update, |current| {
            Ok(patch.apply_to(current))
        })
    }

    pub fn set_enabled(&self, rule_id: &str, enabled: bool, actor: &Actor) -> Result<Rule, RuleError> {
        self.update(rule_id, actor, AuditAction::Enable, |current| {
            let mut next = current.clone();
            next.enabled = enabled;
            Ok(next)
        })
    }

    /// Removes the rule and its history.
    pub fn delete(&self, rule_id: &str, actor: &Actor) -> Result<Rule, RuleError> {
        let mut inner = self.inner.write();
        let removed = inner
            .remove(rule_id)
            .and_then(|mut versions| versions.pop())
            .ok_or_else(|| RuleError::NotFound(rule_id.to_string()))?;

        self.audit.append(AuditRecord::rule(
            actor,
            AuditAction::Delete,
            rule_id,
            snapshot_of(&removed.rule),
            None,
        ));
        info!(rule_id, "rule deleted");
        Ok(removed.rule)
    }

    /// Copies a rule under a new id. The copy starts disabled at version 1.
    /// Without a new id, `<id>-copy` is used.
    pub fn clone_rule(
        &self,
        rule_id: &str,
        new_id: Option<&str>,
        actor: &Actor,
    ) -> Result<Rule, RuleError> {
        let new_id = match new_id {
            Some(raw) => normalized_id(raw),
            None => format!("{rule_id}-copy"),
        };

        let mut inner = self.inner.write();
        let source = inner
            .get(rule_id)
            .and_then(|versions| versions.last())
            .map(|entry| entry.rule.clone())
            .ok_or_else(|| RuleError::NotFound(rule_id.to_string()))?;
        if inner.contains_key(&new_id) {
            return Err(RuleError::AlreadyExists(new_id));
        }

        let mut copy = source.clone();
        copy.id = new_id;
        copy.enabled = false;
        copy.version = 1;
        inner.insert(
            copy.id.clone(),
            vec![RuleHistoryEntry::new(copy.clone(), actor)],
        );

        self.audit.append(AuditRecord::rule(
            actor,
            AuditAction::Clone,
            &copy.id,
            snapshot_of(&source),
            snapshot_of(&copy),
        ));
        info!(rule_id, clone_id = %copy.id, "rule cloned");
        Ok(copy)
    }

    fn update<F>(
        &self,
        rule_id: &str,
        actor: &Actor,
        action: AuditAction,
        change: F,
    ) -> Result<Rule, RuleError>
    where
        F: FnOnce(&Rule) -> Result<Rule, RuleError>,
    {
        let mut inner = self.inner.write();
        let versions = inner
            .get_mut(rule_id)
            .ok_or_else(|| RuleError::NotFound(rule_id.to_string()))?;
        let current = versions
            .last()
            .map(|entry| entry.rule.clone())
            .ok_or_else(|| RuleError::NotFound(rule_id.to_string()))?;

        let mut next = change(&current)?;
        next.id = current.id.clone();
        next.version = current.version + 1;
        validate_structure(&next)?;

        versions.push(RuleHistoryEntry::new(next.clone(), actor));
        self.audit.append(AuditRecord::rule(
            actor,
            action,
            rule_id,
            snapshot_of(&current),
            snapshot_of(&next),
        ));
        info!(rule_id, version = next.version, action = %action, "rule updated");
        Ok(next)
    }
}
