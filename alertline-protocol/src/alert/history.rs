use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifies the per-user, per-rule trigger history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerKey {
    pub tenant_id: String,
    pub user_id: String,
    pub rule_id: String,
}

impl TriggerKey {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        rule_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            rule_id: rule_id.into(),
        }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.user_id, self.rule_id)
    }
}

/// Admission history of one rule for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerHistory {
    pub last_triggered_on: Option<NaiveDate>,
    pub count_today: u32,
    pub today_date: Option<NaiveDate>,
}

impl TriggerHistory {
    /// Admissions already recorded on `date`. Counts from another day do not apply.
    pub fn count_on(&self, date: NaiveDate) -> u32 {
        if self.today_date == Some(date) {
            self.count_today
        } else {
            0
        }
    }

    /// Returns the history after admitting one more alert on `date`.
    pub fn admitted(&self, date: NaiveDate) -> Self {
        Self {
            last_triggered_on: Some(date),
            count_today: self.count_on(date) + 1,
            today_date: Some(date),
        }
    }
}

/// A trigger history entry together with its key, as written to trigger
/// documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerRecord {
    #[serde(flatten)]
    pub key: TriggerKey,
    #[serde(flatten)]
    pub history: TriggerHistory,
}
