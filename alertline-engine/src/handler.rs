use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use alertline_rules::{EvaluationReport, RuleEngine, RuleEvaluation, RuleStatus, SimulationOptions};

use crate::error::EngineRuntimeError;
use crate::runtime::TaskHandler;
use crate::task::{EvaluationOutcome, EvaluationTask, TaskMode};

/// Runs each task through a shared [`RuleEngine`].
#[derive(Clone)]
pub struct EngineTaskHandler {
    engine: Arc<RuleEngine>,
}

impl EngineTaskHandler {
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }
}

fn skipped_ids<'a>(rules: impl Iterator<Item = &'a RuleEvaluation>) -> Vec<String> {
    rules
        .filter(|rule| matches!(rule.status, RuleStatus::Skipped { .. }))
        .map(|rule| rule.rule_id.clone())
        .collect()
}

impl From<EvaluationReport> for EvaluationOutcome {
    fn from(report: EvaluationReport) -> Self {
        let skipped_rules = skipped_ids(report.rules.iter());
        let suppressed = report.suppressed().count();
        Self {
            events: report.events,
            skipped_rules,
            suppressed,
        }
    }
}

#[async_trait]
impl TaskHandler for EngineTaskHandler {
    async fn handle(&self, task: EvaluationTask) -> Result<EvaluationOutcome, EngineRuntimeError> {
        let outcome = match task.mode {
            TaskMode::Evaluate => self
                .engine
                .evaluate_user_report(&task.user_id, task.date, &task.tenant_id)
                .await?
                .into(),
            TaskMode::Simulate { debug } => {
                let result = self
                    .engine
                    .simulate_with(
                        &task.user_id,
                        task.date,
                        &task.tenant_id,
                        SimulationOptions::dry_run(debug),
                    )
                    .await?;
                let rules = result.rules.unwrap_or_default();
                EvaluationOutcome {
                    skipped_rules: skipped_ids(rules.iter()),
                    suppressed: rules
                        .iter()
                        .filter(|rule| matches!(rule.status, RuleStatus::Suppressed { .. }))
                        .count(),
                    events: result.events,
                }
            }
        };
        debug!(user = %task.user_id, events = outcome.events.len(), "task evaluated");
        Ok(outcome)
    }
}
