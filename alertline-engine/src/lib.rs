//! Batch runtime for the alertline rule engine.
//!
//! Evaluating a population of users is a queue of [`EvaluationTask`]s
//! drained by a pool of workers. Tenants are served round-robin; each task
//! runs one [`RuleEngine`](alertline_rules::RuleEngine) pass.

pub mod config;
pub mod error;
pub mod handler;
pub mod runtime;
pub mod scheduler;
pub mod task;

use std::sync::Arc;

use alertline_rules::RuleEngine;

pub use config::BatchConfig;
pub use error::EngineRuntimeError;
pub use handler::EngineTaskHandler;
pub use runtime::{BatchHandle, BatchRuntime, TaskHandler};
pub use scheduler::TaskScheduler;
pub use task::{EvaluationOutcome, EvaluationTask, TaskMode, TaskRecord, TaskStatus};

/// Evaluates every task and returns their records in submission order.
pub async fn run_batch(
    engine: Arc<RuleEngine>,
    tasks: Vec<EvaluationTask>,
    config: &BatchConfig,
) -> Result<Vec<TaskRecord>, EngineRuntimeError> {
    let mut runtime = BatchRuntime::new();
    runtime.start(Arc::new(EngineTaskHandler::new(engine)), config.workers);
    let handle = runtime.handle();

    let submitted: Result<Vec<_>, _> = tasks.into_iter().map(|task| handle.submit(task)).collect();
    handle.wait_idle().await;
    runtime.shutdown().await;

    submitted?.iter().map(|id| handle.get(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertline_protocol::audit::Actor;
    use alertline_protocol::rule::{AggKind, LogicNode, OpKind, Operand, Rule, WeightedMessageSet};
    use alertline_rules::{
        EngineConfig, InMemoryAuditLog, InMemoryMetricStore, InMemoryTriggerStore, RuleCatalog,
        VariableCatalog,
    };
    use chrono::NaiveDate;

    fn engine(triggers: InMemoryTriggerStore) -> Arc<RuleEngine> {
        let catalog = RuleCatalog::new(Arc::new(InMemoryAuditLog::new()));
        catalog
            .create(
                Rule::new(
                    "steps_low",
                    LogicNode::leaf("steps", AggKind::Current, OpKind::Lt, Operand::Scalar(3000.0)),
                    WeightedMessageSet::single("Time for a walk"),
                ),
                &Actor::system(),
            )
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let metrics = InMemoryMetricStore::new();
        for (index, user) in ["u1", "u2", "u3", "u4"].into_iter().enumerate() {
            metrics.record(user, "steps", date, 1000.0 + 1000.0 * index as f64);
        }

        Arc::new(RuleEngine::new(
            catalog,
            VariableCatalog::from_keys(["steps"]),
            Arc::new(metrics),
            Arc::new(triggers),
            EngineConfig::default(),
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_evaluates_every_user() {
        let triggers = InMemoryTriggerStore::new();
        let engine = engine(triggers.clone());
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let tasks = ["u1", "u2", "u3", "u4"]
            .into_iter()
            .map(|user| EvaluationTask::evaluate("default", user, date))
            .collect();

        let records = run_batch(engine, tasks, &BatchConfig { workers: 3 }).await.unwrap();

        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|record| record.status == TaskStatus::Completed));
        let fired: Vec<&str> = records
            .iter()
            .filter(|record| record.outcome.as_ref().is_some_and(|o| !o.events.is_empty()))
            .map(|record| record.task.user_id.as_str())
            .collect();
        assert_eq!(fired, vec!["u1", "u2"]);
        assert_eq!(triggers.len(), 2);
    }

    #[tokio::test]
    async fn simulated_batches_leave_history_alone() {
        let triggers = InMemoryTriggerStore::new();
        let engine = engine(triggers.clone());
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let tasks = vec![EvaluationTask::builder("default", "u1", date).simulate(false).build()];

        let records = run_batch(engine, tasks, &BatchConfig::default()).await.unwrap();

        let outcome = records[0].outcome.clone().unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert!(triggers.is_empty());
    }
}
