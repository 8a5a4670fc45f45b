use std::collections::HashMap;
use std::sync::Arc;

use alertline_protocol::alert::{TriggerHistory, TriggerKey, TriggerRecord};
use alertline_protocol::rule::Rule;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, TriggerStoreError};

/// Trigger history together with the version it was read at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedHistory {
    pub history: TriggerHistory,
    /// Zero when nothing has been stored for the key yet.
    pub version: u64,
}

/// Keyed storage of per-(tenant, user, rule) trigger history with an atomic
/// compare-and-swap update.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn load(&self, key: &TriggerKey) -> Result<VersionedHistory, TriggerStoreError>;

    /// Stores `history` if the entry is still at `expected_version` and
    /// returns the new version, otherwise fails with `Conflict`.
    async fn compare_and_swap(
        &self,
        key: &TriggerKey,
        expected_version: u64,
        history: TriggerHistory,
    ) -> Result<u64, TriggerStoreError>;
}

type HistoryMap = HashMap<TriggerKey, VersionedHistory>;

fn swap_in(
    map: &mut HistoryMap,
    key: &TriggerKey,
    expected_version: u64,
    history: TriggerHistory,
) -> Result<u64, TriggerStoreError> {
    let current = map.get(key).map_or(0, |entry| entry.version);
    if current != expected_version {
        return Err(TriggerStoreError::Conflict {
            key: key.to_string(),
        });
    }
    let version = current + 1;
    map.insert(key.clone(), VersionedHistory { history, version });
    Ok(version)
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryTriggerStore {
    inner: Arc<Mutex<HistoryMap>>,
}

impl InMemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with previously exported records. Later records win
    /// over earlier ones with the same key.
    pub fn from_records(records: impl IntoIterator<Item = TriggerRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|record| {
                let entry = VersionedHistory {
                    history: record.history,
                    version: 1,
                };
                (record.key, entry)
            })
            .collect();
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// Every stored history, ordered by key.
    pub fn records(&self) -> Vec<TriggerRecord> {
        let mut records: Vec<TriggerRecord> = self
            .inner
            .lock()
            .iter()
            .map(|(key, entry)| TriggerRecord {
                key: key.clone(),
                history: entry.history.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    pub fn get(&self, key: &TriggerKey) -> Option<TriggerHistory> {
        self.inner.lock().get(key).map(|entry| entry.history.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn load(&self, key: &TriggerKey) -> Result<VersionedHistory, TriggerStoreError> {
        Ok(self.inner.lock().get(key).cloned().unwrap_or_default())
    }

    async fn compare_and_swap(
        &self,
        key: &TriggerKey,
        expected_version: u64,
        history: TriggerHistory,
    ) -> Result<u64, TriggerStoreError> {
        swap_in(&mut self.inner.lock(), key, expected_version, history)
    }
}

/// Reads through to a base store and keeps every write in a private
/// overlay, leaving the base untouched.
pub struct OverlayTriggerStore {
    base: Arc<dyn TriggerStore>,
    overlay: Mutex<HistoryMap>,
}

impl OverlayTriggerStore {
    pub fn new(base: Arc<dyn TriggerStore>) -> Self {
        Self {
            base,
            overlay: Mutex::new(HashMap::new()),
        }
    }

    /// Histories written through this overlay.
    pub fn pending(&self) -> Vec<(TriggerKey, TriggerHistory)> {
        let mut pending: Vec<_> = self
            .overlay
            .lock()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.history.clone()))
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        pending
    }
}

#[async_trait]
impl TriggerStore for OverlayTriggerStore {
    async fn load(&self, key: &TriggerKey) -> Result<VersionedHistory, TriggerStoreError> {
        let written = self.overlay.lock().get(key).cloned();
        if let Some(entry) = written {
            return Ok(entry);
        }
        self.base.load(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &TriggerKey,
        expected_version: u64,
        history: TriggerHistory,
    ) -> Result<u64, TriggerStoreError> {
        let mut overlay = self.overlay.lock();
        if overlay.contains_key(key) {
            return swap_in(&mut overlay, key, expected_version, history);
        }
        // First write for the key: the caller read the base version.
        let version = expected_version + 1;
        overlay.insert(key.clone(), VersionedHistory { history, version });
        Ok(version)
    }
}

/// Why an otherwise matching rule was not admitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuppressionReason {
    Cooldown {
        last_triggered_on: NaiveDate,
        days_remaining: i64,
    },
    DailyCap { count_today: u32, max_per_day: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Carries the history as stored after the admission.
    Admitted(TriggerHistory),
    Suppressed(SuppressionReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

/// Applies the cooldown and daily cap of `rule` to `history`, returning the
/// history to store on admission.
pub fn check(
    rule: &Rule,
    history: &TriggerHistory,
    date: NaiveDate,
) -> Result<TriggerHistory, SuppressionReason> {
    if rule.cooldown_days > 0 {
        if let Some(last) = history.last_triggered_on {
            let gap = (date - last).num_days();
            let cooldown = i64::from(rule.cooldown_days);
            if gap < cooldown {
                return Err(SuppressionReason::Cooldown {
                    last_triggered_on: last,
                    days_remaining: cooldown - gap,
                });
            }
        }
    }

    let count_today = history.count_on(date);
    if count_today >= rule.max_per_day {
        return Err(SuppressionReason::DailyCap {
            count_today,
            max_per_day: rule.max_per_day,
        });
    }

    Ok(history.admitted(date))
}

/// Enforces cooldowns and daily caps with a check-and-update that is atomic
/// per (tenant, user, rule).
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn TriggerStore>,
    max_retries: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn TriggerStore>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub fn store(&self) -> Arc<dyn TriggerStore> {
        Arc::clone(&self.store)
    }

    /// Same policy over a different store.
    pub fn with_store(&self, store: Arc<dyn TriggerStore>) -> Self {
        Self {
            store,
            max_retries: self.max_retries,
        }
    }

    /// Admits the rule for the user on `date`, mutating the trigger history
    /// only on admission. Write conflicts are retried `max_retries` times.
    pub async fn admit(
        &self,
        rule: &Rule,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Admission, EngineError> {
        let key = TriggerKey::new(&rule.tenant_id, user_id, &rule.id);
        let attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let current = match self.store.load(&key).await {
                Ok(current) => current,
                Err(TriggerStoreError::Conflict { .. }) => continue,
                Err(TriggerStoreError::Unavailable(message)) => {
                    return Err(EngineError::StoreUnavailable(message))
                }
            };

            let next = match check(rule, &current.history, date) {
                Ok(next) => next,
                Err(reason) => return Ok(Admission::Suppressed(reason)),
            };

            match self
                .store
                .compare_and_swap(&key, current.version, next.clone())
                .await
            {
                Ok(_) => return Ok(Admission::Admitted(next)),
                Err(TriggerStoreError::Conflict { .. }) => {
                    debug!(key = %key, attempt, "trigger history changed, retrying admission");
                }
                Err(TriggerStoreError::Unavailable(message)) => {
                    return Err(EngineError::StoreUnavailable(message))
                }
            }
        }

        Err(EngineError::ConcurrencyConflict {
            key: key.to_string(),
            attempts,
        })
    }
}
