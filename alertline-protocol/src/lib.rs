//! Shared data model of the alertline rule engine: rules and their condition
//! trees, evaluation traces, alert events, trigger history and audit records.

pub mod alert;
pub mod audit;
pub mod rule;
pub mod variable;

pub mod prelude {
    pub use crate::alert::{
        AggregateFailure, AlertEvent, ConditionTrace, EvaluationTrace, TriggerHistory, TriggerKey,
        TriggerRecord,
    };
    pub use crate::audit::{Actor, AuditAction, AuditQuery, AuditRecord};
    pub use crate::rule::{
        AggKind, CombinatorKind, Condition, LogicNode, MessageCandidate, OpKind, Operand, Rule,
        RulePatch, WeightedMessageSet,
    };
    pub use crate::variable::VariableDef;
}
