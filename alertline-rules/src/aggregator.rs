use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use alertline_protocol::alert::AggregateFailure;
use alertline_protocol::rule::AggKind;
use chrono::NaiveDate;
use tracing::debug;

use crate::error::{AggregateError, MetricStoreError};
use crate::metrics::{window_start, MetricStore, Observation};

/// Computes windowed statistics over a user's metric history.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn MetricStore>,
    current_lookback_days: u32,
}

impl Aggregator {
    pub fn new(store: Arc<dyn MetricStore>, current_lookback_days: u32) -> Self {
        Self {
            store,
            current_lookback_days: current_lookback_days.max(1),
        }
    }

    pub fn current_lookback_days(&self) -> u32 {
        self.current_lookback_days
    }

    /// Resolves a single aggregate with its own store read.
    pub async fn compute(
        &self,
        user_id: &str,
        variable: &str,
        agg: AggKind,
        as_of: NaiveDate,
    ) -> Result<f64, AggregateError> {
        let window = agg.window_days(self.current_lookback_days);
        let history = self
            .store
            .fetch_history(user_id, variable, as_of, window)
            .await?;
        compute_from_history(variable, agg, as_of, &history, self.current_lookback_days)
    }

    /// Resolves every referenced `(variable, aggregator)` pair, reading each
    /// variable once over the widest window it needs. Missing or insufficient
    /// data is recorded per pair; an unreachable store fails the snapshot.
    pub async fn snapshot(
        &self,
        user_id: &str,
        as_of: NaiveDate,
        refs: &BTreeSet<(String, AggKind)>,
    ) -> Result<AggregateSnapshot, AggregateError> {
        let mut by_variable: BTreeMap<&str, Vec<AggKind>> = BTreeMap::new();
        for (variable, agg) in refs {
            by_variable.entry(variable.as_str()).or_default().push(*agg);
        }

        let mut snapshot = AggregateSnapshot::default();
        for (variable, aggs) in by_variable {
            let window = aggs
                .iter()
                .map(|agg| agg.window_days(self.current_lookback_days))
                .max()
                .unwrap_or(1);

            match self
                .store
                .fetch_history(user_id, variable, as_of, window)
                .await
            {
                Ok(history) => {
                    for agg in aggs {
                        let value = statistic(agg, as_of, &history, self.current_lookback_days);
                        snapshot.insert(variable, agg, value);
                    }
                }
                Err(MetricStoreError::Unavailable(message)) => {
                    return Err(AggregateError::StoreUnavailable(message));
                }
                Err(MetricStoreError::MissingData { .. }) => {
                    debug!(user_id, variable, "no history recorded for variable");
                    for agg in aggs {
                        snapshot.insert(
                            variable,
                            agg,
                            Err(AggregateFailure::MissingData {
                                detail: format!("no history recorded for '{variable}'"),
                            }),
                        );
                    }
                }
            }
        }

        Ok(snapshot)
    }

    /// Every aggregate of every listed variable, for inspection.
    pub async fn features(
        &self,
        user_id: &str,
        as_of: NaiveDate,
        variables: &[String],
    ) -> Result<AggregateSnapshot, AggregateError> {
        let refs = variables
            .iter()
            .flat_map(|variable| AggKind::ALL.iter().map(move |agg| (variable.clone(), *agg)))
            .collect();
        self.snapshot(user_id, as_of, &refs).await
    }
}

/// Pure form of [`Aggregator::compute`] over an already fetched history.
/// Observations outside the aggregator's window (including any dated after
/// `as_of`) are ignored.
pub fn compute_from_history(
    variable: &str,
    agg: AggKind,
    as_of: NaiveDate,
    history: &[Observation],
    current_lookback_days: u32,
) -> Result<f64, AggregateError> {
    statistic(agg, as_of, history, current_lookback_days).map_err(|failure| match failure {
        AggregateFailure::MissingData { detail } => AggregateError::MissingData {
            var: variable.to_string(),
            detail,
        },
        AggregateFailure::InsufficientData { detail } => {
            AggregateError::insufficient(variable, agg, detail)
        }
    })
}

fn statistic(
    agg: AggKind,
    as_of: NaiveDate,
    history: &[Observation],
    current_lookback_days: u32,
) -> Result<f64, AggregateFailure> {
    let window = |days: u32| -> Vec<Observation> {
        let start = window_start(as_of, days);
        let mut observations: Vec<Observation> = history
            .iter()
            .filter(|obs| obs.date >= start && obs.date <= as_of && obs.value.is_finite())
            .copied()
            .collect();
        observations.sort_by_key(|obs| obs.date);
        observations
    };
    let values = |days: u32| -> Vec<f64> { window(days).into_iter().map(|obs| obs.value).collect() };

    match agg {
        AggKind::Current => {
            let days = agg.window_days(current_lookback_days);
            window(days)
                .last()
                .map(|obs| obs.value)
                .ok_or_else(|| AggregateFailure::MissingData {
                    detail: format!("no observation within {days} days of {as_of}"),
                })
        }
        AggKind::Mean3d | AggKind::Mean7d | AggKind::Mean14d => {
            let days = agg.window_days(current_lookback_days);
            mean(&values(days)).ok_or_else(|| empty_window(days))
        }
        AggKind::Median14d => {
            let days = agg.window_days(current_lookback_days);
            median(&values(days)).ok_or_else(|| empty_window(days))
        }
        AggKind::DeltaPct3v14 => {
            let short = mean(&values(3)).ok_or_else(|| empty_window(3))?;
            let long = mean(&values(14)).ok_or_else(|| empty_window(14))?;
            if long == 0.0 {
                return Err(AggregateFailure::InsufficientData {
                    detail: "mean_14d is zero".to_string(),
                });
            }
            Ok((short - long) / long)
        }
        AggKind::Zscore28d => {
            let observations = window(agg.window_days(current_lookback_days));
            let Some((current, baseline)) = observations.split_last() else {
                return Err(empty_window(28));
            };
            let baseline: Vec<f64> = baseline.iter().map(|obs| obs.value).collect();
            if baseline.len() < 2 {
                return Err(AggregateFailure::InsufficientData {
                    detail: format!("{} baseline observations, need at least 2", baseline.len()),
                });
            }
            let (mean, stddev) = match (mean(&baseline), population_stddev(&baseline)) {
                (Some(mean), Some(stddev)) => (mean, stddev),
                _ => return Err(empty_window(28)),
            };
            if stddev == 0.0 {
                return Err(AggregateFailure::InsufficientData {
                    detail: "baseline standard deviation is zero".to_string(),
                });
            }
            Ok((current.value - mean) / stddev)
        }
    }
}

fn empty_window(days: u32) -> AggregateFailure {
    AggregateFailure::InsufficientData {
        detail: format!("no observations in the trailing {days} days"),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn population_stddev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance =
        values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Resolved aggregates for one user and date, keyed by `(variable, aggregator)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSnapshot {
    values: BTreeMap<(String, AggKind), Result<f64, AggregateFailure>>,
}

/// `variable -> aggregator -> value` view of a snapshot; `None` marks a
/// failed aggregate.
pub type FeatureTable = BTreeMap<String, BTreeMap<String, Option<f64>>>;

impl AggregateSnapshot {
    pub fn insert(
        &mut self,
        variable: impl Into<String>,
        agg: AggKind,
        value: Result<f64, AggregateFailure>,
    ) {
        self.values.insert((variable.into(), agg), value);
    }

    /// The resolved aggregate. Pairs that were never fetched read as missing.
    pub fn get(&self, variable: &str, agg: AggKind) -> Result<f64, AggregateFailure> {
        self.values
            .get(&(variable.to_string(), agg))
            .cloned()
            .unwrap_or_else(|| {
                Err(AggregateFailure::MissingData {
                    detail: format!("{variable}:{agg} was not resolved"),
                })
            })
    }

    pub fn value(&self, variable: &str, agg: AggKind) -> Option<f64> {
        self.get(variable, agg).ok()
    }

    pub fn contains(&self, variable: &str, agg: AggKind) -> bool {
        self.values.contains_key(&(variable.to_string(), agg))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_table(&self) -> FeatureTable {
        let mut table = FeatureTable::new();
        for ((variable, agg), value) in &self.values {
            table
                .entry(variable.clone())
                .or_default()
                .insert(agg.as_str().to_string(), value.as_ref().ok().copied());
        }
        table
    }
}
