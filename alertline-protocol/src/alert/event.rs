use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::trace::EvaluationTrace;

/// Alert produced by the rule engine for an admitted rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub rule_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub date: NaiveDate,
    pub category: String,
    pub priority: i32,
    pub severity: i32,
    pub locale: String,
    /// Identifier of the selected candidate, or its position when it has none.
    pub message_id: String,
    pub message_text: String,
    /// Placeholders that could not be rendered into `message_text`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub why: EvaluationTrace,
}
