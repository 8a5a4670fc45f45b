use alertline_rules::EngineError;
use thiserror::Error;

/// Errors that may occur when interacting with the batch runtime.
#[derive(Debug, Error)]
pub enum EngineRuntimeError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("runtime is shutting down")]
    ShuttingDown,
    #[error("invalid tenant id")]
    InvalidTenant,
    #[error("invalid user id")]
    InvalidUser,
    #[error(transparent)]
    Evaluation(#[from] EngineError),
}
