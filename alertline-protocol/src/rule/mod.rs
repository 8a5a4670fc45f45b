mod logic;
mod messages;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use logic::{AggKind, CombinatorKind, Condition, LogicNode, OpKind, Operand};
pub use messages::{MessageCandidate, WeightedMessageSet};

/// Tenant-scoped alerting rule: a condition tree plus the messages it emits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    /// Unique, immutable identifier.
    pub id: String,
    /// Revision counter maintained by the rule catalog.
    #[serde(default = "Rule::default_version")]
    pub version: u32,
    #[serde(default = "Rule::default_tenant")]
    pub tenant_id: String,
    #[serde(default = "Rule::default_enabled")]
    pub enabled: bool,
    /// Optional human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
    /// Evaluation ordering. Higher numbers are evaluated first.
    #[serde(default = "Rule::default_priority")]
    pub priority: i32,
    #[serde(default = "Rule::default_severity")]
    pub severity: i32,
    /// Minimum number of days between two admissions for the same user.
    #[serde(default)]
    pub cooldown_days: u32,
    /// Maximum admissions per user and calendar day. Must be at least one.
    #[serde(default = "Rule::default_max_per_day")]
    pub max_per_day: u32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub logic: LogicNode,
    pub messages: WeightedMessageSet,
}

impl Rule {
    /// Creates an enabled rule with default limits for the `default` tenant.
    pub fn new(id: impl Into<String>, logic: LogicNode, messages: WeightedMessageSet) -> Self {
        Self {
            id: id.into(),
            version: Self::default_version(),
            tenant_id: Self::default_tenant(),
            enabled: Self::default_enabled(),
            description: None,
            category: String::new(),
            priority: Self::default_priority(),
            severity: Self::default_severity(),
            cooldown_days: 0,
            max_per_day: Self::default_max_per_day(),
            tags: BTreeSet::new(),
            logic,
            messages,
        }
    }

    pub fn default_version() -> u32 {
        1
    }

    pub fn default_tenant() -> String {
        "default".to_string()
    }

    pub fn default_enabled() -> bool {
        true
    }

    pub fn default_priority() -> i32 {
        50
    }

    pub fn default_severity() -> i32 {
        1
    }

    pub fn default_max_per_day() -> u32 {
        1
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_limits(mut self, cooldown_days: u32, max_per_day: u32) -> Self {
        self.cooldown_days = cooldown_days;
        self.max_per_day = max_per_day;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Partial update of named rule fields. Absent fields are left untouched;
/// `messages` and `logic` are replaced as a whole when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RulePatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub severity: Option<i32>,
    #[serde(default)]
    pub cooldown_days: Option<u32>,
    #[serde(default)]
    pub max_per_day: Option<u32>,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub logic: Option<LogicNode>,
    #[serde(default)]
    pub messages: Option<WeightedMessageSet>,
}

impl RulePatch {
    /// Returns a copy of `rule` with the patch applied.
    pub fn apply_to(&self, rule: &Rule) -> Rule {
        let mut next = rule.clone();
        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if let Some(tenant_id) = &self.tenant_id {
            next.tenant_id = tenant_id.clone();
        }
        if let Some(description) = &self.description {
            next.description = Some(description.clone());
        }
        if let Some(category) = &self.category {
            next.category = category.clone();
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        if let Some(severity) = self.severity {
            next.severity = severity;
        }
        if let Some(cooldown_days) = self.cooldown_days {
            next.cooldown_days = cooldown_days;
        }
        if let Some(max_per_day) = self.max_per_day {
            next.max_per_day = max_per_day;
        }
        if let Some(tags) = &self.tags {
            next.tags = tags.clone();
        }
        if let Some(logic) = &self.logic {
            next.logic = logic.clone();
        }
        if let Some(messages) = &self.messages {
            next.messages = messages.clone();
        }
        next
    }
}
