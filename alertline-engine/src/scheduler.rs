use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::task::EvaluationTask;

#[derive(Default)]
struct Queues {
    by_tenant: HashMap<String, VecDeque<EvaluationTask>>,
    rotation: VecDeque<String>,
}

/// Multi-tenant scheduler: FIFO within a tenant, round-robin across tenants
/// so one large tenant cannot starve the others.
#[derive(Default, Clone)]
pub struct TaskScheduler {
    inner: Arc<Mutex<Queues>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, task: EvaluationTask) {
        let mut inner = self.inner.lock();
        let tenant_id = task.tenant_id.clone();
        inner
            .by_tenant
            .entry(tenant_id.clone())
            .or_default()
            .push_back(task);
        if !inner.rotation.contains(&tenant_id) {
            inner.rotation.push_back(tenant_id);
        }
    }

    /// Pops the next task of the tenant whose turn it is.
    pub fn next_task(&self) -> Option<EvaluationTask> {
        let mut inner = self.inner.lock();
        while let Some(tenant) = inner.rotation.pop_front() {
            let Some(queue) = inner.by_tenant.get_mut(&tenant) else {
                continue;
            };
            let task = queue.pop_front();
            if queue.is_empty() {
                inner.by_tenant.remove(&tenant);
            } else {
                inner.rotation.push_back(tenant);
            }
            if task.is_some() {
                return task;
            }
        }
        None
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().by_tenant.values().map(VecDeque::len).sum()
    }

    pub fn pending_for_tenant(&self, tenant: &str) -> usize {
        self.inner
            .lock()
            .by_tenant
            .get(tenant)
            .map_or(0, VecDeque::len)
    }

    pub fn tenants(&self) -> Vec<String> {
        self.inner.lock().rotation.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn task(tenant: &str, user: &str) -> EvaluationTask {
        EvaluationTask::evaluate(tenant, user, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[test]
    fn enforces_round_robin_between_tenants() {
        let scheduler = TaskScheduler::new();
        scheduler.enqueue(task("a", "u1"));
        scheduler.enqueue(task("a", "u2"));
        scheduler.enqueue(task("a", "u3"));
        scheduler.enqueue(task("b", "u9"));

        let order: Vec<(String, String)> = std::iter::from_fn(|| scheduler.next_task())
            .map(|task| (task.tenant_id, task.user_id))
            .collect();

        let expected: Vec<(String, String)> = [("a", "u1"), ("b", "u9"), ("a", "u2"), ("a", "u3")]
            .into_iter()
            .map(|(t, u)| (t.to_string(), u.to_string()))
            .collect();
        assert_eq!(order, expected);
        assert_eq!(scheduler.pending(), 0);
        assert!(scheduler.tenants().is_empty());
    }

    #[test]
    fn counts_pending_per_tenant() {
        let scheduler = TaskScheduler::new();
        scheduler.enqueue(task("a", "u1"));
        scheduler.enqueue(task("b", "u2"));
        scheduler.enqueue(task("b", "u3"));

        assert_eq!(scheduler.pending(), 3);
        assert_eq!(scheduler.pending_for_tenant("b"), 2);
        assert_eq!(scheduler.pending_for_tenant("zzz"), 0);
    }
}
