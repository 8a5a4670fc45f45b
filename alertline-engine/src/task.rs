use alertline_protocol::alert::AlertEvent;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a task runs the rule engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TaskMode {
    /// Real evaluation, recording admissions.
    #[default]
    Evaluate,
    /// Dry-run simulation.
    Simulate { debug: bool },
}

/// One user to evaluate for one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationTask {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub mode: TaskMode,
    pub created_at: DateTime<Utc>,
}

impl EvaluationTask {
    pub fn builder(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        date: NaiveDate,
    ) -> EvaluationTaskBuilder {
        EvaluationTaskBuilder {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            date,
            mode: TaskMode::default(),
        }
    }

    pub fn evaluate(tenant_id: impl Into<String>, user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self::builder(tenant_id, user_id, date).build()
    }
}

pub struct EvaluationTaskBuilder {
    tenant_id: String,
    user_id: String,
    date: NaiveDate,
    mode: TaskMode,
}

impl EvaluationTaskBuilder {
    pub fn mode(mut self, mode: TaskMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn simulate(self, debug: bool) -> Self {
        self.mode(TaskMode::Simulate { debug })
    }

    pub fn build(self) -> EvaluationTask {
        EvaluationTask {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            date: self.date,
            mode: self.mode,
            created_at: Utc::now(),
        }
    }
}

/// Current status of a submitted task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Summary of one finished evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvaluationOutcome {
    pub events: Vec<AlertEvent>,
    /// Ids of misconfigured rules that were skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_rules: Vec<String>,
    pub suppressed: usize,
}

/// In-memory record that tracks the lifecycle of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub task: EvaluationTask,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub outcome: Option<EvaluationOutcome>,
}

impl TaskRecord {
    pub fn new(task: EvaluationTask) -> Self {
        Self {
            task,
            status: TaskStatus::Queued,
            started_at: None,
            finished_at: None,
            last_error: None,
            outcome: None,
        }
    }

    pub(crate) fn start(&mut self, at: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.started_at = Some(at);
        self.last_error = None;
    }

    pub(crate) fn finish(&mut self, result: Result<EvaluationOutcome, String>) {
        self.finished_at = Some(Utc::now());
        match result {
            Ok(outcome) => {
                self.status = TaskStatus::Completed;
                self.outcome = Some(outcome);
            }
            Err(error) => {
                self.status = TaskStatus::Failed;
                self.last_error = Some(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tracks_lifecycle() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let task = EvaluationTask::builder("acme", "u1", date).simulate(true).build();
        assert_eq!(task.mode, TaskMode::Simulate { debug: true });

        let mut record = TaskRecord::new(task);
        assert_eq!(record.status, TaskStatus::Queued);
        record.start(Utc::now());
        assert_eq!(record.status, TaskStatus::Running);
        record.finish(Err("store unavailable".into()));
        assert!(record.status.is_finished());
        assert_eq!(record.last_error.as_deref(), Some("store unavailable"));
    }
}
