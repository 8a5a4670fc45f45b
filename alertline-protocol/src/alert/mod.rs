mod event;
mod history;
mod trace;

pub use event::AlertEvent;
pub use history::{TriggerHistory, TriggerKey, TriggerRecord};
pub use trace::{AggregateFailure, ConditionTrace, EvaluationTrace};
