use std::sync::Arc;

use alertline_protocol::audit::{AuditQuery, AuditRecord};
use parking_lot::RwLock;
use tracing::debug;

/// Append-only destination for rule mutation records.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord);
}

/// In-process audit trail that can be queried back.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLog {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matching records, newest first, truncated to the query limit.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        let records = self.records.read();
        let matching = records.iter().rev().filter(|record| query.matches(record));
        match query.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, record: AuditRecord) {
        debug!(
            action = %record.action,
            entity_id = %record.entity_id,
            user = %record.user,
            "audit record appended"
        );
        self.records.write().push(record);
    }
}
