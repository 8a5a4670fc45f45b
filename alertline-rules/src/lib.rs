//! Behavioral alerting rule engine.
//!
//! Rules are boolean condition trees over windowed statistics of per-user
//! daily metrics. For a user and date the [`RuleEngine`] resolves the
//! aggregates every enabled rule of the tenant references, evaluates each
//! tree with a complete trace, applies cooldowns and daily caps through the
//! [`RateLimiter`], and turns admitted matches into [`AlertEvent`]s carrying a
//! deterministically selected message. [`RuleEngine::simulate`] runs the same
//! pass against a private copy of the trigger history.
//!
//! [`AlertEvent`]: alertline_protocol::alert::AlertEvent

mod aggregator;
mod alerts;
mod audit;
mod catalog;
mod condition;
mod config;
mod engine;
mod error;
mod evaluator;
mod limiter;
mod loader;
mod messages;
mod metrics;
mod outcome;
mod simulation;
mod validation;
mod variables;

pub use aggregator::{compute_from_history, AggregateSnapshot, Aggregator, FeatureTable};
pub use alerts::{
    AlertSink, DailyCount, FiredAlert, InMemoryAlertLog, TriggerReport, TriggerSeries,
};
pub use audit::{AuditSink, InMemoryAuditLog};
pub use catalog::{slugify_id, RuleCatalog, RuleFilter, RuleHistoryEntry};
pub use condition::{check_operand, compare, evaluate, evaluate_condition, EQ_EPSILON};
pub use config::EngineConfig;
pub use engine::RuleEngine;
pub use error::{
    AggregateError, AlertQueryError, EngineError, MetricStoreError, RuleError, TriggerStoreError,
};
pub use evaluator::evaluate_tree;
pub use limiter::{
    check as check_admission, Admission, InMemoryTriggerStore, OverlayTriggerStore, RateLimiter,
    SuppressionReason, TriggerStore, VersionedHistory,
};
pub use loader::{
    export_rules, export_triggers, load_metrics, load_rules, load_triggers, load_variables,
};
pub use messages::{
    check_messages, placeholder_refs, render, select, selection_draw, RenderedMessage,
    SelectedMessage,
};
pub use metrics::{window_start, InMemoryMetricStore, MetricRecord, MetricStore, Observation};
pub use outcome::{EvaluationReport, RuleEvaluation, RuleStatus, SimulationMode, SimulationResult};
pub use simulation::SimulationOptions;
pub use validation::{validate_for_evaluation, validate_structure, MAX_LOGIC_DEPTH};
pub use variables::VariableCatalog;
