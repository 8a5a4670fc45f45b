use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::MetricStoreError;

/// One recorded value of a variable on a calendar day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Read interface of the external per-user metric store.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Observations of `variable` for `user_id` dated within the
    /// `window_days` calendar days ending at `as_of` (inclusive), ordered by
    /// date. Days without a value are omitted.
    async fn fetch_history(
        &self,
        user_id: &str,
        variable: &str,
        as_of: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<Observation>, MetricStoreError>;
}

/// First day of the `window_days` window ending at `as_of`.
pub fn window_start(as_of: NaiveDate, window_days: u32) -> NaiveDate {
    let span = u64::from(window_days.max(1) - 1);
    as_of.checked_sub_days(Days::new(span)).unwrap_or(NaiveDate::MIN)
}

/// Row of a metrics document: the values one user recorded on one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    pub user_id: String,
    pub date: NaiveDate,
    /// `null` marks a day without a value for that variable.
    #[serde(default)]
    pub values: BTreeMap<String, Option<f64>>,
}

type UserSeries = HashMap<String, BTreeMap<NaiveDate, f64>>;

/// In-process metric store keyed by user, then variable.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMetricStore {
    inner: Arc<RwLock<HashMap<String, UserSeries>>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value for the same day.
    /// Non-finite values are treated as absent.
    pub fn record(&self, user_id: &str, variable: &str, date: NaiveDate, value: f64) {
        if !value.is_finite() {
            return;
        }
        let mut inner = self.inner.write();
        inner
            .entry(user_id.to_string())
            .or_default()
            .entry(variable.to_string())
            .or_default()
            .insert(date, value);
    }

    pub fn record_all(&self, records: &[MetricRecord]) {
        for record in records {
            for (variable, value) in &record.values {
                if let Some(value) = value {
                    self.record(&record.user_id, variable, record.date, *value);
                }
            }
        }
    }

    pub fn users(&self) -> BTreeSet<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Every variable recorded for at least one user.
    pub fn variables(&self) -> BTreeSet<String> {
        self.inner
            .read()
            .values()
            .flat_map(|series| series.keys().cloned())
            .collect()
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn fetch_history(
        &self,
        user_id: &str,
        variable: &str,
        as_of: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<Observation>, MetricStoreError> {
        let inner = self.inner.read();
        let series = inner
            .get(user_id)
            .and_then(|variables| variables.get(variable))
            .ok_or_else(|| MetricStoreError::MissingData {
                user_id: user_id.to_string(),
                variable: variable.to_string(),
            })?;

        let start = window_start(as_of, window_days);
        Ok(series
            .range(start..=as_of)
            .map(|(date, value)| Observation::new(*date, *value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[tokio::test]
    async fn returns_only_the_requested_window() {
        let store = InMemoryMetricStore::new();
        for d in 1..=10 {
            store.record("u1", "steps", day(d), f64::from(d));
        }

        let history = store.fetch_history("u1", "steps", day(8), 3).await.unwrap();
        let dates: Vec<_> = history.iter().map(|obs| obs.date).collect();
        assert_eq!(dates, vec![day(6), day(7), day(8)]);
    }

    #[tokio::test]
    async fn unknown_variable_is_missing_data() {
        let store = InMemoryMetricStore::new();
        store.record("u1", "steps", day(1), 1.0);

        let err = store.fetch_history("u1", "sleep", day(1), 7).await.unwrap_err();
        assert!(matches!(err, MetricStoreError::MissingData { .. }));
    }

    #[test]
    fn records_skip_null_and_non_finite_values() {
        let store = InMemoryMetricStore::new();
        let mut values = BTreeMap::new();
        values.insert("steps".to_string(), Some(1200.0));
        values.insert("sleep".to_string(), None);
        store.record_all(&[MetricRecord {
            user_id: "u1".into(),
            date: day(2),
            values,
        }]);
        store.record("u1", "hrv", day(2), f64::NAN);

        assert_eq!(store.variables().into_iter().collect::<Vec<_>>(), vec!["steps"]);
        assert_eq!(store.users().len(), 1);
    }
}
