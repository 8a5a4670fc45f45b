use alertline_protocol::rule::Rule;

use crate::condition::check_operand;
use crate::error::RuleError;
use crate::messages::check_messages;
use crate::variables::VariableCatalog;

/// Deepest logic tree accepted, counting the root and the leaves.
/// Evaluation and tracing recurse once per level.
pub const MAX_LOGIC_DEPTH: usize = 32;

/// Checks what a rule must satisfy on its own: limits, nesting depth,
/// message weights and operand shapes.
pub fn validate_structure(rule: &Rule) -> Result<(), RuleError> {
    if rule.max_per_day == 0 {
        return Err(RuleError::InvalidLimits {
            rule_id: rule.id.clone(),
            reason: "max_per_day must be at least 1".to_string(),
        });
    }
    let depth = rule.logic.depth();
    if depth > MAX_LOGIC_DEPTH {
        return Err(RuleError::LogicTooDeep {
            rule_id: rule.id.clone(),
            depth,
            max: MAX_LOGIC_DEPTH,
        });
    }
    check_messages(&rule.id, &rule.messages)?;
    rule.logic
        .conditions()
        .into_iter()
        .try_for_each(check_operand)
}

/// Structural checks plus the variable catalog lookup done before a rule is
/// evaluated.
pub fn validate_for_evaluation(rule: &Rule, variables: &VariableCatalog) -> Result<(), RuleError> {
    validate_structure(rule)?;
    variables.validate_rule(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertline_protocol::rule::{AggKind, LogicNode, OpKind, Operand, WeightedMessageSet};

    fn rule(logic: LogicNode) -> Rule {
        Rule::new("r1", logic, WeightedMessageSet::single("hi"))
    }

    #[test]
    fn rejects_zero_daily_cap() {
        let rule = rule(LogicNode::all(vec![])).with_limits(0, 0);
        assert!(matches!(
            validate_structure(&rule),
            Err(RuleError::InvalidLimits { .. })
        ));
    }

    fn nested(levels: usize) -> LogicNode {
        let mut node = LogicNode::leaf("x", AggKind::Current, OpKind::Gt, Operand::Scalar(1.0));
        for _ in 1..levels {
            node = LogicNode::all(vec![node]);
        }
        node
    }

    #[test]
    fn logic_nesting_is_bounded() {
        assert!(validate_structure(&rule(nested(MAX_LOGIC_DEPTH))).is_ok());
        assert!(matches!(
            validate_structure(&rule(nested(40))),
            Err(RuleError::LogicTooDeep { depth: 40, max: MAX_LOGIC_DEPTH, .. })
        ));
    }

    #[test]
    fn nested_malformed_operand_is_found() {
        let rule = rule(LogicNode::any(vec![LogicNode::none(vec![LogicNode::leaf(
            "x",
            AggKind::Current,
            OpKind::Between,
            Operand::List(vec![3.0, 1.0]),
        )])]));
        assert!(matches!(
            validate_structure(&rule),
            Err(RuleError::MalformedOperand { .. })
        ));
    }

    #[test]
    fn evaluation_requires_known_variables() {
        let rule = rule(LogicNode::leaf(
            "x",
            AggKind::Current,
            OpKind::Gt,
            Operand::Scalar(5.0),
        ));
        assert!(validate_for_evaluation(&rule, &VariableCatalog::from_keys(["x"])).is_ok());
        assert!(matches!(
            validate_for_evaluation(&rule, &VariableCatalog::new()),
            Err(RuleError::UnknownVariable { .. })
        ));
    }
}
