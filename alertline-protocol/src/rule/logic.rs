use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named statistic computed over a fixed trailing window of a metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggKind {
    #[serde(rename = "current")]
    Current,
    #[serde(rename = "mean_3d")]
    Mean3d,
    #[serde(rename = "mean_7d")]
    Mean7d,
    #[serde(rename = "mean_14d")]
    Mean14d,
    #[serde(rename = "median_14d")]
    Median14d,
    #[serde(rename = "delta_pct_3v14")]
    DeltaPct3v14,
    #[serde(rename = "zscore_28d")]
    Zscore28d,
}

impl AggKind {
    pub const ALL: [AggKind; 7] = [
        AggKind::Current,
        AggKind::Mean3d,
        AggKind::Mean7d,
        AggKind::Mean14d,
        AggKind::Median14d,
        AggKind::DeltaPct3v14,
        AggKind::Zscore28d,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggKind::Current => "current",
            AggKind::Mean3d => "mean_3d",
            AggKind::Mean7d => "mean_7d",
            AggKind::Mean14d => "mean_14d",
            AggKind::Median14d => "median_14d",
            AggKind::DeltaPct3v14 => "delta_pct_3v14",
            AggKind::Zscore28d => "zscore_28d",
        }
    }

    /// Number of trailing calendar days (inclusive of the evaluation date)
    /// the statistic needs. `current` has no fixed window, so the caller
    /// supplies its lookback.
    pub fn window_days(&self, current_lookback_days: u32) -> u32 {
        match self {
            AggKind::Current => current_lookback_days.max(1),
            AggKind::Mean3d => 3,
            AggKind::Mean7d => 7,
            AggKind::Mean14d | AggKind::Median14d | AggKind::DeltaPct3v14 => 14,
            AggKind::Zscore28d => 28,
        }
    }
}

impl Default for AggKind {
    fn default() -> Self {
        AggKind::Current
    }
}

impl fmt::Display for AggKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AggKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("unknown aggregator '{value}'"))
    }
}

/// Comparison operator of a leaf condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OpKind {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "in")]
    In,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Lt => "<",
            OpKind::Le => "<=",
            OpKind::Gt => ">",
            OpKind::Ge => ">=",
            OpKind::Eq => "==",
            OpKind::Between => "between",
            OpKind::In => "in",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a condition. `between` expects a two element list,
/// `in` a set of candidate values, every other operator a scalar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Operand {
    Scalar(f64),
    List(Vec<f64>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Scalar(value) => write!(f, "{value}"),
            Operand::List(values) => {
                let joined: Vec<String> = values.iter().map(|value| value.to_string()).collect();
                write!(f, "[{}]", joined.join(", "))
            }
        }
    }
}

/// Leaf test comparing an aggregated metric value against an operand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub var: String,
    #[serde(default)]
    pub agg: AggKind,
    pub op: OpKind,
    pub value: Operand,
}

impl Condition {
    pub fn new(var: impl Into<String>, agg: AggKind, op: OpKind, value: Operand) -> Self {
        Self {
            var: var.into(),
            agg,
            op,
            value,
        }
    }
}

/// Boolean aggregation applied by a combinator node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CombinatorKind {
    All,
    Any,
    None,
}

impl CombinatorKind {
    /// Result of a combinator with no children.
    pub fn empty_result(&self) -> bool {
        match self {
            CombinatorKind::All => true,
            CombinatorKind::Any => false,
            CombinatorKind::None => true,
        }
    }

    /// Folds child results using the combinator semantics.
    pub fn combine(&self, results: &[bool]) -> bool {
        if results.is_empty() {
            return self.empty_result();
        }
        match self {
            CombinatorKind::All => results.iter().all(|result| *result),
            CombinatorKind::Any => results.iter().any(|result| *result),
            CombinatorKind::None => !results.iter().any(|result| *result),
        }
    }
}

/// Node of a rule's condition tree.
///
/// On the wire a combinator is written as `{"all": [...]}`, `{"any": [...]}`
/// or `{"none": [...]}` and a leaf as `{"var", "agg", "op", "value"}`; the
/// conversion to this typed form happens once at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawNode", into = "RawNode")]
pub enum LogicNode {
    Condition(Condition),
    Combinator {
        kind: CombinatorKind,
        children: Vec<LogicNode>,
    },
}

impl LogicNode {
    pub fn all(children: Vec<LogicNode>) -> Self {
        LogicNode::Combinator {
            kind: CombinatorKind::All,
            children,
        }
    }

    pub fn any(children: Vec<LogicNode>) -> Self {
        LogicNode::Combinator {
            kind: CombinatorKind::Any,
            children,
        }
    }

    pub fn none(children: Vec<LogicNode>) -> Self {
        LogicNode::Combinator {
            kind: CombinatorKind::None,
            children,
        }
    }

    pub fn leaf(var: impl Into<String>, agg: AggKind, op: OpKind, value: Operand) -> Self {
        LogicNode::Condition(Condition::new(var, agg, op, value))
    }

    /// Number of nodes on the longest root-to-leaf path. A lone condition has
    /// depth 1. Walks with an explicit stack so it is safe on any tree.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, level)) = stack.pop() {
            deepest = deepest.max(level);
            if let LogicNode::Combinator { children, .. } = node {
                stack.extend(children.iter().map(|child| (child, level + 1)));
            }
        }
        deepest
    }

    /// Every leaf condition in depth-first, left-to-right order.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            LogicNode::Condition(condition) => out.push(condition),
            LogicNode::Combinator { children, .. } => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
        }
    }

    /// Distinct `(variable, aggregator)` pairs referenced by the tree.
    pub fn references(&self) -> BTreeSet<(String, AggKind)> {
        self.conditions()
            .into_iter()
            .map(|condition| (condition.var.clone(), condition.agg))
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawNode {
    All(AllGroup),
    Any(AnyGroup),
    None(NoneGroup),
    Leaf(Condition),
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllGroup {
    all: Vec<LogicNode>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnyGroup {
    any: Vec<LogicNode>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoneGroup {
    none: Vec<LogicNode>,
}

impl From<RawNode> for LogicNode {
    fn from(raw: RawNode) -> Self {
        match raw {
            RawNode::All(group) => LogicNode::all(group.all),
            RawNode::Any(group) => LogicNode::any(group.any),
            RawNode::None(group) => LogicNode::none(group.none),
            RawNode::Leaf(condition) => LogicNode::Condition(condition),
        }
    }
}

impl From<LogicNode> for RawNode {
    fn from(node: LogicNode) -> Self {
        match node {
            LogicNode::Condition(condition) => RawNode::Leaf(condition),
            LogicNode::Combinator { kind, children } => match kind {
                CombinatorKind::All => RawNode::All(AllGroup { all: children }),
                CombinatorKind::Any => RawNode::Any(AnyGroup { any: children }),
                CombinatorKind::None => RawNode::None(NoneGroup { none: children }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_wire_format() {
        let node: LogicNode = serde_json::from_value(json!({
            "all": [
                {"var": "steps", "agg": "mean_7d", "op": "<", "value": 4000},
                {"none": [{"var": "sleep", "op": "between", "value": [6, 9]}]}
            ]
        }))
        .expect("parse logic");

        let LogicNode::Combinator { kind, children } = &node else {
            panic!("expected combinator");
        };
        assert_eq!(*kind, CombinatorKind::All);
        assert_eq!(children.len(), 2);
        assert_eq!(
            children[0],
            LogicNode::leaf("steps", AggKind::Mean7d, OpKind::Lt, Operand::Scalar(4000.0))
        );

        let refs = node.references();
        assert!(refs.contains(&("sleep".to_string(), AggKind::Current)));
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn serializes_back_to_keyed_groups() {
        let node = LogicNode::any(vec![]);
        assert_eq!(serde_json::to_value(&node).unwrap(), json!({"any": []}));
    }

    #[test]
    fn rejects_unknown_aggregator() {
        let result: Result<LogicNode, _> =
            serde_json::from_value(json!({"var": "x", "agg": "mean_99d", "op": ">", "value": 1}));
        assert!(result.is_err());
        assert!("mean_99d".parse::<AggKind>().is_err());
        assert_eq!("zscore_28d".parse::<AggKind>(), Ok(AggKind::Zscore28d));
    }

    #[test]
    fn empty_combinators_have_fixed_defaults() {
        assert!(CombinatorKind::All.combine(&[]));
        assert!(!CombinatorKind::Any.combine(&[]));
        assert!(CombinatorKind::None.combine(&[]));
        assert!(!CombinatorKind::None.combine(&[false, true]));
    }

    #[test]
    fn depth_counts_the_longest_path() {
        let leaf = || LogicNode::leaf("x", AggKind::Current, OpKind::Gt, Operand::Scalar(1.0));
        assert_eq!(leaf().depth(), 1);
        assert_eq!(LogicNode::all(vec![]).depth(), 1);

        let tree = LogicNode::any(vec![leaf(), LogicNode::none(vec![LogicNode::all(vec![leaf()])])]);
        assert_eq!(tree.depth(), 4);
    }
}
