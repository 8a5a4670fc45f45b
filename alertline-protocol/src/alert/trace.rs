use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rule::{AggKind, CombinatorKind, OpKind, Operand};

/// Why an aggregate could not be resolved for a condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateFailure {
    MissingData { detail: String },
    InsufficientData { detail: String },
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFailure::MissingData { detail } => write!(f, "missing data: {detail}"),
            AggregateFailure::InsufficientData { detail } => {
                write!(f, "insufficient data: {detail}")
            }
        }
    }
}

/// Annotated leaf of an evaluation trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionTrace {
    pub var: String,
    pub agg: AggKind,
    pub op: OpKind,
    pub operand: Operand,
    /// Resolved aggregate value, absent when the aggregate failed.
    pub observed: Option<f64>,
    pub result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<AggregateFailure>,
}

/// Structured record of every sub-evaluation performed while scoring a rule.
/// Mirrors the shape of the evaluated [`LogicNode`](crate::rule::LogicNode).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum EvaluationTrace {
    Condition(ConditionTrace),
    Combinator {
        kind: CombinatorKind,
        result: bool,
        children: Vec<EvaluationTrace>,
    },
}

impl EvaluationTrace {
    pub fn result(&self) -> bool {
        match self {
            EvaluationTrace::Condition(leaf) => leaf.result,
            EvaluationTrace::Combinator { result, .. } => *result,
        }
    }

    /// Leaves of the trace in evaluation order.
    pub fn leaves(&self) -> Vec<&ConditionTrace> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ConditionTrace>) {
        match self {
            EvaluationTrace::Condition(leaf) => out.push(leaf),
            EvaluationTrace::Combinator { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}
