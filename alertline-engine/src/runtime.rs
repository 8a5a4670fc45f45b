use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::EngineRuntimeError;
use crate::scheduler::TaskScheduler;
use crate::task::{EvaluationOutcome, EvaluationTask, TaskRecord};

#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: EvaluationTask) -> Result<EvaluationOutcome, EngineRuntimeError>;
}

type Registry = Arc<RwLock<HashMap<Uuid, TaskRecord>>>;

/// Handle returned when the runtime is running, used to submit tasks.
#[derive(Clone)]
pub struct BatchHandle {
    scheduler: TaskScheduler,
    registry: Registry,
    notify: Arc<Notify>,
    finished: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
}

impl BatchHandle {
    pub fn submit(&self, task: EvaluationTask) -> Result<Uuid, EngineRuntimeError> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Err(EngineRuntimeError::ShuttingDown);
        }
        if task.tenant_id.trim().is_empty() {
            return Err(EngineRuntimeError::InvalidTenant);
        }
        if task.user_id.trim().is_empty() {
            return Err(EngineRuntimeError::InvalidUser);
        }

        let task_id = task.id;
        self.registry
            .write()
            .insert(task_id, TaskRecord::new(task.clone()));

        self.scheduler.enqueue(task);
        self.notify.notify_one();
        Ok(task_id)
    }

    pub fn get(&self, task_id: &Uuid) -> Result<TaskRecord, EngineRuntimeError> {
        self.registry
            .read()
            .get(task_id)
            .cloned()
            .ok_or_else(|| EngineRuntimeError::TaskNotFound(task_id.to_string()))
    }

    pub fn list_for_tenant(&self, tenant: &str) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self
            .registry
            .read()
            .values()
            .filter(|record| record.task.tenant_id == tenant)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.task.created_at.cmp(&b.task.created_at));
        records
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    /// True once every submitted task has completed or failed.
    pub fn is_idle(&self) -> bool {
        self.registry
            .read()
            .values()
            .all(|record| record.status.is_finished())
    }

    /// Waits until every submitted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let finished = self.finished.notified();
            if self.is_idle() {
                return;
            }
            finished.await;
        }
    }
}

/// Worker pool that evaluates queued users with a [`TaskHandler`].
pub struct BatchRuntime {
    scheduler: TaskScheduler,
    registry: Registry,
    notify: Arc<Notify>,
    finished: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Default for BatchRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchRuntime {
    pub fn new() -> Self {
        Self {
            scheduler: TaskScheduler::new(),
            registry: Arc::new(RwLock::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
            finished: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    pub fn handle(&self) -> BatchHandle {
        BatchHandle {
            scheduler: self.scheduler.clone(),
            registry: self.registry.clone(),
            notify: self.notify.clone(),
            finished: self.finished.clone(),
            shutting_down: self.shutting_down.clone(),
        }
    }

    pub fn start<H>(&mut self, handler: Arc<H>, worker_count: usize)
    where
        H: TaskHandler,
    {
        let worker_count = worker_count.max(1);
        for worker_index in 0..worker_count {
            let worker = Worker {
                index: worker_index,
                scheduler: self.scheduler.clone(),
                registry: self.registry.clone(),
                notify: self.notify.clone(),
                finished: self.finished.clone(),
                shutting_down: self.shutting_down.clone(),
            };
            let handler = handler.clone();
            self.workers
                .push(tokio::spawn(async move { worker.run(handler).await }));
        }
        info!(workers = worker_count, "batch runtime started");
    }

    /// Stops accepting tasks and joins the workers. Queued tasks that no
    /// worker picked up yet stay queued.
    pub async fn shutdown(self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
        for handle in self.workers {
            if let Err(err) = handle.await {
                error!("worker crashed: {:?}", err);
            }
        }
    }
}

struct Worker {
    index: usize,
    scheduler: TaskScheduler,
    registry: Registry,
    notify: Arc<Notify>,
    finished: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
}

impl Worker {
    async fn run<H: TaskHandler>(self, handler: Arc<H>) {
        while let Some(task) = self.next().await {
            if let Some(record) = self.registry.write().get_mut(&task.id) {
                record.start(chrono::Utc::now());
            }

            debug!(worker = self.index, task_id = %task.id, tenant = %task.tenant_id, user = %task.user_id, "evaluating");

            let task_id = task.id;
            let result = handler
                .handle(task)
                .await
                .map_err(|err| err.to_string());
            if let Err(err) = &result {
                error!(%task_id, error = %err, "evaluation task failed");
            }

            if let Some(record) = self.registry.write().get_mut(&task_id) {
                record.finish(result);
            }
            self.finished.notify_waiters();
        }
    }

    async fn next(&self) -> Option<EvaluationTask> {
        loop {
            if self.shutting_down.load(Ordering::Relaxed) {
                return None;
            }
            let notified = self.notify.notified();
            if let Some(task) = self.scheduler.next_task() {
                return Some(task);
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use chrono::NaiveDate;

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle(
            &self,
            task: EvaluationTask,
        ) -> Result<EvaluationOutcome, EngineRuntimeError> {
            if task.user_id == "broken" {
                return Err(EngineRuntimeError::TaskNotFound(task.user_id));
            }
            Ok(EvaluationOutcome::default())
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn processes_tasks_until_idle() {
        let mut runtime = BatchRuntime::new();
        runtime.start(Arc::new(EchoHandler), 2);
        let handle = runtime.handle();

        for (tenant, user) in [("a", "u1"), ("b", "u2"), ("a", "broken")] {
            handle.submit(EvaluationTask::evaluate(tenant, user, date())).unwrap();
        }
        handle.wait_idle().await;

        let tasks_a = handle.list_for_tenant("a");
        assert_eq!(tasks_a.len(), 2);
        assert_eq!(tasks_a[0].status, TaskStatus::Completed);
        assert_eq!(tasks_a[1].status, TaskStatus::Failed);
        assert!(tasks_a[1].last_error.is_some());
        assert_eq!(handle.pending_tasks(), 0);

        runtime.shutdown().await;
        let rejected = handle.submit(EvaluationTask::evaluate("a", "u3", date()));
        assert!(matches!(rejected, Err(EngineRuntimeError::ShuttingDown)));
    }

    #[tokio::test]
    async fn rejects_blank_identifiers() {
        let runtime = BatchRuntime::new();
        let handle = runtime.handle();
        assert!(matches!(
            handle.submit(EvaluationTask::evaluate(" ", "u1", date())),
            Err(EngineRuntimeError::InvalidTenant)
        ));
        assert!(matches!(
            handle.submit(EvaluationTask::evaluate("a", "", date())),
            Err(EngineRuntimeError::InvalidUser)
        ));
        assert!(matches!(
            handle.get(&Uuid::new_v4()),
            Err(EngineRuntimeError::TaskNotFound(_))
        ));
    }
}
