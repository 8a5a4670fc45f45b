use alertline_protocol::alert::{AlertEvent, EvaluationTrace};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::limiter::SuppressionReason;

/// What happened to one rule during a pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleStatus {
    NotMatched,
    Suppressed { reason: SuppressionReason },
    Admitted { message_id: String },
    /// The rule is misconfigured and was not evaluated.
    Skipped { error: String },
}

/// Per-rule entry of an evaluation report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleEvaluation {
    pub rule_id: String,
    pub priority: i32,
    #[serde(flatten)]
    pub status: RuleStatus,
    /// Absent only for skipped rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<EvaluationTrace>,
}

impl RuleEvaluation {
    pub fn matched(&self) -> bool {
        self.trace.as_ref().is_some_and(EvaluationTrace::result)
    }
}

/// Result of evaluating every enabled rule of a tenant for one user and date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationReport {
    pub user_id: String,
    pub tenant_id: String,
    pub date: NaiveDate,
    pub events: Vec<AlertEvent>,
    pub rules: Vec<RuleEvaluation>,
}

impl EvaluationReport {
    pub fn skipped(&self) -> impl Iterator<Item = &RuleEvaluation> {
        self.rules
            .iter()
            .filter(|rule| matches!(rule.status, RuleStatus::Skipped { .. }))
    }

    pub fn suppressed(&self) -> impl Iterator<Item = &RuleEvaluation> {
        self.rules
            .iter()
            .filter(|rule| matches!(rule.status, RuleStatus::Suppressed { .. }))
    }
}

/// How a simulation treats trigger history.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// Admissions are computed against a private copy; stored history is untouched.
    #[default]
    DryRun,
    /// Admissions are written to the real trigger store.
    Commit,
}

/// Outcome of a simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationResult {
    pub count: usize,
    pub events: Vec<AlertEvent>,
    pub mode: SimulationMode,
    /// Per-rule breakdown, including non-matching rules, when debugging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleEvaluation>>,
}

impl SimulationResult {
    pub fn from_report(report: EvaluationReport, mode: SimulationMode, debug: bool) -> Self {
        Self {
            count: report.events.len(),
            events: report.events,
            mode,
            rules: debug.then_some(report.rules),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_is_flattened_into_the_rule_entry() {
        let entry = RuleEvaluation {
            rule_id: "r1".into(),
            priority: 50,
            status: RuleStatus::Suppressed {
                reason: SuppressionReason::DailyCap {
                    count_today: 1,
                    max_per_day: 1,
                },
            },
            trace: None,
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["status"], "suppressed");
        assert_eq!(value["reason"]["reason"], json!("daily_cap"));
        assert!(!entry.matched());
    }
}
