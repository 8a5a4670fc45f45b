use std::path::PathBuf;

use alertline_protocol::alert::AggregateFailure;
use alertline_protocol::rule::{AggKind, OpKind};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors returned when loading, validating or mutating rules. Configuration
/// variants are reported per rule by the engine, which skips the offending
/// rule and carries on with the pass.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rules path does not exist: {0}")]
    MissingPath(String),
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("duplicate rule identifier detected: {id}")]
    DuplicateRule { id: String },
    #[error("rule not found: {0}")]
    NotFound(String),
    #[error("rule already exists: {0}")]
    AlreadyExists(String),
    #[error("rule identifier cannot change from {expected} to {actual}")]
    IdMismatch { expected: String, actual: String },
    #[error("unknown variable '{var}'")]
    UnknownVariable { var: String },
    #[error("aggregator {agg} is not allowed for variable '{var}'")]
    AggregatorNotAllowed { var: String, agg: AggKind },
    #[error("malformed operand for {var} {op}: {reason}")]
    MalformedOperand {
        var: String,
        op: OpKind,
        reason: String,
    },
    #[error("rule {rule_id} has no message candidates")]
    EmptyMessageSet { rule_id: String },
    #[error("rule {rule_id} has an invalid message weight {weight}")]
    InvalidWeight { rule_id: String, weight: f64 },
    #[error("invalid limits for rule {rule_id}: {reason}")]
    InvalidLimits { rule_id: String, reason: String },
    #[error("logic of rule {rule_id} is nested {depth} levels deep, the limit is {max}")]
    LogicTooDeep {
        rule_id: String,
        depth: usize,
        max: usize,
    },
}

impl RuleError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuleError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }

    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RuleError::Parse {
            path: path.into().display().to_string(),
            message: message.into(),
        }
    }

    /// Whether the error describes a broken rule definition rather than an
    /// I/O or catalog problem.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RuleError::UnknownVariable { .. }
                | RuleError::AggregatorNotAllowed { .. }
                | RuleError::MalformedOperand { .. }
                | RuleError::EmptyMessageSet { .. }
                | RuleError::InvalidWeight { .. }
                | RuleError::InvalidLimits { .. }
                | RuleError::LogicTooDeep { .. }
        )
    }
}

/// Errors raised by a [`MetricStore`](crate::metrics::MetricStore) read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetricStoreError {
    #[error("variable '{variable}' is unknown for user {user_id}")]
    MissingData { user_id: String, variable: String },
    #[error("metric store unavailable: {0}")]
    Unavailable(String),
}

/// Failure to resolve one aggregate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregateError {
    #[error("missing data for '{var}': {detail}")]
    MissingData { var: String, detail: String },
    #[error("insufficient data for {var}:{agg}: {detail}")]
    InsufficientData {
        var: String,
        agg: AggKind,
        detail: String,
    },
    #[error("metric store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AggregateError {
    pub(crate) fn insufficient(var: &str, agg: AggKind, detail: impl Into<String>) -> Self {
        AggregateError::InsufficientData {
            var: var.to_string(),
            agg,
            detail: detail.into(),
        }
    }

    /// Trace representation for the non-fatal variants. `StoreUnavailable`
    /// aborts the pass and never reaches a trace.
    pub fn as_failure(&self) -> Option<AggregateFailure> {
        match self {
            AggregateError::MissingData { detail, .. } => Some(AggregateFailure::MissingData {
                detail: detail.clone(),
            }),
            AggregateError::InsufficientData { detail, .. } => {
                Some(AggregateFailure::InsufficientData {
                    detail: detail.clone(),
                })
            }
            AggregateError::StoreUnavailable(_) => None,
        }
    }
}

impl From<MetricStoreError> for AggregateError {
    fn from(err: MetricStoreError) -> Self {
        match err {
            MetricStoreError::MissingData { variable, .. } => AggregateError::MissingData {
                detail: format!("no history recorded for '{variable}'"),
                var: variable,
            },
            MetricStoreError::Unavailable(message) => AggregateError::StoreUnavailable(message),
        }
    }
}

/// Errors raised by a [`TriggerStore`](crate::limiter::TriggerStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TriggerStoreError {
    #[error("trigger history for {key} changed concurrently")]
    Conflict { key: String },
    #[error("trigger store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by alert history queries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlertQueryError {
    #[error("end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// Errors that abort a whole evaluation pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("admission for {key} kept conflicting after {attempts} attempts")]
    ConcurrencyConflict { key: String, attempts: u32 },
}

impl From<AggregateError> for EngineError {
    fn from(err: AggregateError) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}
