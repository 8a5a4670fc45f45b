// Batch evaluation of several tenants through the worker pool.
use std::sync::Arc;

use alertline::engine::{run_batch, BatchConfig, EvaluationTask, TaskStatus};
use alertline::prelude::*;
use chrono::NaiveDate;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, 20).unwrap()
}

fn tenant_rule(tenant: &str) -> Rule {
    Rule::new(
        format!("{tenant}_low_sleep"),
        LogicNode::leaf("sleep", AggKind::Current, OpKind::Lt, Operand::Scalar(6.0)),
        WeightedMessageSet::single(format!("{tenant}: sleep more")),
    )
    .with_tenant(tenant)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_tenant_is_evaluated_with_its_own_rules() -> anyhow::Result<()> {
    let catalog = RuleCatalog::new(Arc::new(InMemoryAuditLog::new()));
    for tenant in ["acme", "globex"] {
        catalog.create(tenant_rule(tenant), &Actor::system())?;
    }
    let metrics = InMemoryMetricStore::new();
    for (user, hours) in [("u1", 5.0), ("u2", 8.0), ("u3", 4.5)] {
        metrics.record(user, "sleep", date(), hours);
    }
    let triggers = InMemoryTriggerStore::new();
    let engine = Arc::new(RuleEngine::new(
        catalog,
        VariableCatalog::from_keys(["sleep"]),
        Arc::new(metrics.clone()),
        Arc::new(triggers.clone()),
        EngineConfig::default(),
    ));

    let mut tasks = Vec::new();
    for tenant in ["acme", "globex"] {
        for user in metrics.users() {
            tasks.push(EvaluationTask::evaluate(tenant, user, date()));
        }
    }
    let records = run_batch(engine, tasks, &BatchConfig { workers: 4 }).await?;

    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|record| record.status == TaskStatus::Completed));
    for record in &records {
        let outcome = record.outcome.as_ref().expect("completed task has an outcome");
        for event in &outcome.events {
            assert_eq!(event.tenant_id, record.task.tenant_id);
            assert!(event.rule_id.starts_with(&record.task.tenant_id));
        }
    }
    let alerts: usize = records
        .iter()
        .filter_map(|record| record.outcome.as_ref())
        .map(|outcome| outcome.events.len())
        .sum();
    assert_eq!(alerts, 4);
    assert_eq!(triggers.len(), 4);
    Ok(())
}
