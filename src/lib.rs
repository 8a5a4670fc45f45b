//! Alertline: behavioral alerting over per-user daily metrics.
//!
//! The workspace is split into focused crates, re-exported here:
//!
//! * [`protocol`]: rules, condition trees, traces, alert events, audit records
//! * [`rules`]: aggregation, evaluation, message selection, rate limiting,
//!   the rule catalog and the [`RuleEngine`](rules::RuleEngine)
//! * [`engine`]: the multi-tenant batch runtime
//! * [`alertline_core`]: configuration, errors, logging and document helpers

pub use alertline_core;
pub use alertline_engine as engine;
pub use alertline_protocol as protocol;
pub use alertline_rules as rules;

/// The types most callers need to build and run an engine.
pub mod prelude {
    pub use alertline_protocol::prelude::*;
    pub use alertline_rules::{
        compute_from_history, evaluate_tree, select, AggregateSnapshot, AlertSink, EngineConfig,
        EngineError, InMemoryAlertLog, InMemoryAuditLog, InMemoryMetricStore, InMemoryTriggerStore, MetricStore,
        MetricStoreError, Observation, RuleCatalog, RuleEngine, RuleStatus, SimulationOptions,
        SuppressionReason, VariableCatalog,
    };
}
