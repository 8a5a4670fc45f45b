use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use alertline_protocol::alert::AlertEvent;
use chrono::{Duration, NaiveDate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AlertQueryError;

/// Receives every alert a committing pass emits.
pub trait AlertSink: Send + Sync {
    fn record(&self, event: &AlertEvent);
}

/// What is kept of an emitted alert for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FiredAlert {
    pub rule_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub date: NaiveDate,
    pub message_id: String,
}

impl From<&AlertEvent> for FiredAlert {
    fn from(event: &AlertEvent) -> Self {
        Self {
            rule_id: event.rule_id.clone(),
            user_id: event.user_id.clone(),
            tenant_id: event.tenant_id.clone(),
            date: event.date,
            message_id: event.message_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// Per-day alert counts of one rule, one point for every day of the range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerSeries {
    pub rule_id: String,
    pub points: Vec<DailyCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub series: Vec<TriggerSeries>,
}

/// In-process record of fired alerts with a daily count query.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAlertLog {
    fired: Arc<RwLock<Vec<FiredAlert>>>,
}

impl InMemoryAlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fired(&self) -> Vec<FiredAlert> {
        self.fired.read().clone()
    }

    pub fn len(&self) -> usize {
        self.fired.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.read().is_empty()
    }

    /// Daily alert counts of a tenant between `start` and `end` inclusive.
    ///
    /// With `rule_ids` the series follow the given order, including rules
    /// that never fired. Without it every rule that fired in the range gets a
    /// series, ordered by id.
    pub fn triggers(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        tenant_id: &str,
        rule_ids: Option<&[String]>,
    ) -> Result<TriggerReport, AlertQueryError> {
        if end < start {
            return Err(AlertQueryError::InvalidRange { start, end });
        }

        let mut counts: BTreeMap<(&str, NaiveDate), u64> = BTreeMap::new();
        let fired = self.fired.read();
        for alert in fired.iter() {
            let in_scope = alert.tenant_id == tenant_id
                && alert.date >= start
                && alert.date <= end
                && rule_ids.map_or(true, |ids| ids.contains(&alert.rule_id));
            if in_scope {
                *counts.entry((alert.rule_id.as_str(), alert.date)).or_default() += 1;
            }
        }

        let rules: Vec<String> = match rule_ids {
            Some(ids) => ids.to_vec(),
            None => counts
                .keys()
                .map(|(rule_id, _)| rule_id.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };

        let days = (end - start).num_days();
        let series = rules
            .into_iter()
            .map(|rule_id| {
                let points = (0..=days)
                    .map(|offset| {
                        let date = start + Duration::days(offset);
                        let count = counts.get(&(rule_id.as_str(), date)).copied().unwrap_or(0);
                        DailyCount { date, count }
                    })
                    .collect();
                TriggerSeries { rule_id, points }
            })
            .collect();

        Ok(TriggerReport { start, end, series })
    }
}

impl AlertSink for InMemoryAlertLog {
    fn record(&self, event: &AlertEvent) {
        debug!(
            rule_id = %event.rule_id,
            user_id = %event.user_id,
            date = %event.date,
            "alert recorded"
        );
        self.fired.write().push(FiredAlert::from(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn fire(log: &InMemoryAlertLog, tenant: &str, rule: &str, user: &str, date: NaiveDate) {
        log.fired.write().push(FiredAlert {
            rule_id: rule.into(),
            user_id: user.into(),
            tenant_id: tenant.into(),
            date,
            message_id: "0".into(),
        });
    }

    fn counts(series: &TriggerSeries) -> Vec<u64> {
        series.points.iter().map(|point| point.count).collect()
    }

    #[test]
    fn counts_every_day_of_the_range() {
        let log = InMemoryAlertLog::new();
        fire(&log, "default", "sleep", "u1", day(2));
        fire(&log, "default", "sleep", "u2", day(2));
        fire(&log, "default", "steps", "u1", day(3));
        fire(&log, "default", "steps", "u1", day(9));
        fire(&log, "other", "sleep", "u1", day(2));

        let report = log.triggers(day(1), day(3), "default", None).unwrap();

        assert_eq!(report.series.len(), 2);
        assert_eq!(report.series[0].rule_id, "sleep");
        assert_eq!(counts(&report.series[0]), vec![0, 2, 0]);
        assert_eq!(report.series[1].rule_id, "steps");
        assert_eq!(counts(&report.series[1]), vec![0, 0, 1]);
        assert_eq!(report.series[1].points[2].date, day(3));
    }

    #[test]
    fn requested_rules_are_reported_even_when_silent() {
        let log = InMemoryAlertLog::new();
        fire(&log, "default", "sleep", "u1", day(1));
        fire(&log, "default", "steps", "u1", day(1));

        let ids = vec!["quiet".to_string(), "sleep".to_string()];
        let report = log.triggers(day(1), day(1), "default", Some(&ids)).unwrap();

        let rules: Vec<_> = report.series.iter().map(|s| s.rule_id.as_str()).collect();
        assert_eq!(rules, vec!["quiet", "sleep"]);
        assert_eq!(counts(&report.series[0]), vec![0]);
        assert_eq!(counts(&report.series[1]), vec![1]);
    }

    #[test]
    fn reversed_range_is_rejected() {
        let log = InMemoryAlertLog::new();
        assert_eq!(
            log.triggers(day(5), day(4), "default", None),
            Err(AlertQueryError::InvalidRange {
                start: day(5),
                end: day(4),
            })
        );
    }
}
