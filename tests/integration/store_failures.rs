// Store outages and concurrent admissions against the rule engine.
use std::sync::Arc;

use alertline::prelude::*;
use alertline::rules::{TriggerStore, TriggerStoreError, VersionedHistory};
use async_trait::async_trait;
use chrono::NaiveDate;
use test_case::test_case;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()
}

/// Serves `x` from memory and fails every read of `y`.
struct FlakyStore {
    inner: InMemoryMetricStore,
}

#[async_trait]
impl MetricStore for FlakyStore {
    async fn fetch_history(
        &self,
        user_id: &str,
        variable: &str,
        as_of: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<Observation>, MetricStoreError> {
        if variable == "y" {
            return Err(MetricStoreError::Unavailable("connection refused".into()));
        }
        self.inner
            .fetch_history(user_id, variable, as_of, window_days)
            .await
    }
}

fn rule(id: &str, var: &str, priority: i32) -> Rule {
    Rule::new(
        id,
        LogicNode::leaf(var, AggKind::Current, OpKind::Gt, Operand::Scalar(0.0)),
        WeightedMessageSet::single(format!("{id} fired")),
    )
    .with_priority(priority)
}

fn catalog(rules: Vec<Rule>) -> RuleCatalog {
    let catalog = RuleCatalog::new(Arc::new(InMemoryAuditLog::new()));
    for rule in rules {
        catalog.create(rule, &Actor::system()).unwrap();
    }
    catalog
}

#[tokio::test]
async fn unavailable_store_aborts_before_any_admission() {
    let inner = InMemoryMetricStore::new();
    inner.record("u1", "x", date(), 1.0);
    let triggers = InMemoryTriggerStore::new();
    let engine = RuleEngine::new(
        catalog(vec![rule("x_rule", "x", 90), rule("y_rule", "y", 10)]),
        VariableCatalog::from_keys(["x", "y"]),
        Arc::new(FlakyStore { inner }),
        Arc::new(triggers.clone()),
        EngineConfig::default(),
    );

    let err = engine.evaluate_user("u1", date(), "default").await.unwrap_err();

    assert!(matches!(err, EngineError::StoreUnavailable(_)));
    assert!(triggers.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_passes_admit_once() {
    let metrics = InMemoryMetricStore::new();
    metrics.record("u1", "x", date(), 3.0);
    let triggers = InMemoryTriggerStore::new();
    let engine = Arc::new(RuleEngine::new(
        catalog(vec![rule("x_rule", "x", 50).with_limits(2, 1)]),
        VariableCatalog::from_keys(["x"]),
        Arc::new(metrics),
        Arc::new(triggers.clone()),
        EngineConfig {
            max_admit_retries: 16,
            ..EngineConfig::default()
        },
    ));

    let passes: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.evaluate_user("u1", date(), "default").await })
        })
        .collect();

    let mut admitted = 0;
    for pass in passes {
        admitted += pass.await.unwrap().unwrap().len();
    }
    assert_eq!(admitted, 1);

    let key = TriggerKey::new("default", "u1", "x_rule");
    let history = triggers.get(&key).unwrap();
    assert_eq!(history.count_on(date()), 1);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FailingCall {
    Load,
    Swap,
}

/// Trigger history that goes down for one rule only.
struct PartialOutage {
    inner: InMemoryTriggerStore,
    rule_id: &'static str,
    call: FailingCall,
}

impl PartialOutage {
    fn fails(&self, key: &TriggerKey, call: FailingCall) -> bool {
        key.rule_id == self.rule_id && self.call == call
    }
}

#[async_trait]
impl TriggerStore for PartialOutage {
    async fn load(&self, key: &TriggerKey) -> Result<VersionedHistory, TriggerStoreError> {
        if self.fails(key, FailingCall::Load) {
            return Err(TriggerStoreError::Unavailable("read timed out".into()));
        }
        self.inner.load(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &TriggerKey,
        expected_version: u64,
        history: TriggerHistory,
    ) -> Result<u64, TriggerStoreError> {
        if self.fails(key, FailingCall::Swap) {
            return Err(TriggerStoreError::Unavailable("write rejected".into()));
        }
        self.inner
            .compare_and_swap(key, expected_version, history)
            .await
    }
}

#[test_case(FailingCall::Load ; "on load")]
#[test_case(FailingCall::Swap ; "on compare and swap")]
#[tokio::test]
async fn trigger_outage_keeps_earlier_admissions(call: FailingCall) {
    let metrics = InMemoryMetricStore::new();
    metrics.record("u1", "x", date(), 1.0);
    let triggers = InMemoryTriggerStore::new();
    let outage = PartialOutage {
        inner: triggers.clone(),
        rule_id: "b",
        call,
    };
    let engine = RuleEngine::new(
        catalog(vec![rule("a", "x", 90), rule("b", "x", 10)]),
        VariableCatalog::from_keys(["x"]),
        Arc::new(metrics),
        Arc::new(outage),
        EngineConfig::default(),
    );

    let err = engine.evaluate_user("u1", date(), "default").await.unwrap_err();

    assert!(matches!(err, EngineError::StoreUnavailable(_)));
    let committed = triggers.get(&TriggerKey::new("default", "u1", "a")).unwrap();
    assert_eq!(committed.count_on(date()), 1);
    assert!(triggers.get(&TriggerKey::new("default", "u1", "b")).is_none());
}
