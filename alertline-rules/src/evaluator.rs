use alertline_protocol::alert::EvaluationTrace;
use alertline_protocol::rule::LogicNode;

use crate::aggregator::AggregateSnapshot;
use crate::condition::evaluate_condition;
use crate::error::RuleError;

/// Evaluates a condition tree depth-first, left to right. Every child is
/// evaluated even once the combinator's result is settled, so the returned
/// trace covers the whole tree.
pub fn evaluate_tree(
    node: &LogicNode,
    snapshot: &AggregateSnapshot,
) -> Result<(bool, EvaluationTrace), RuleError> {
    let trace = trace_node(node, snapshot)?;
    Ok((trace.result(), trace))
}

fn trace_node(node: &LogicNode, snapshot: &AggregateSnapshot) -> Result<EvaluationTrace, RuleError> {
    match node {
        LogicNode::Condition(condition) => {
            let aggregate = snapshot.get(&condition.var, condition.agg);
            evaluate_condition(condition, aggregate).map(EvaluationTrace::Condition)
        }
        LogicNode::Combinator { kind, children } => {
            let children = children
                .iter()
                .map(|child| trace_node(child, snapshot))
                .collect::<Result<Vec<_>, _>>()?;
            let results: Vec<bool> = children.iter().map(EvaluationTrace::result).collect();
            Ok(EvaluationTrace::Combinator {
                kind: *kind,
                result: kind.combine(&results),
                children,
            })
        }
    }
}
