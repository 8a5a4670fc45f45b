use alertline_protocol::alert::{AggregateFailure, ConditionTrace};
use alertline_protocol::rule::{Condition, OpKind, Operand};

use crate::error::RuleError;

/// Tolerance applied by `==` and `in`.
pub const EQ_EPSILON: f64 = 1e-9;

fn malformed(condition: &Condition, reason: impl Into<String>) -> RuleError {
    RuleError::MalformedOperand {
        var: condition.var.clone(),
        op: condition.op,
        reason: reason.into(),
    }
}

/// Checks that the operand has the shape its operator expects.
pub fn check_operand(condition: &Condition) -> Result<(), RuleError> {
    match (&condition.op, &condition.value) {
        (OpKind::Between, Operand::List(bounds)) => match bounds.as_slice() {
            [low, high] if low.is_finite() && high.is_finite() && low <= high => Ok(()),
            [low, high] if low > high => Err(malformed(
                condition,
                format!("range [{low}, {high}] is not ordered low <= high"),
            )),
            [_, _] => Err(malformed(condition, "range bounds must be finite numbers")),
            other => Err(malformed(
                condition,
                format!("expected exactly two bounds, got {}", other.len()),
            )),
        },
        (OpKind::Between, Operand::Scalar(_)) => {
            Err(malformed(condition, "expected a [low, high] range"))
        }
        (OpKind::In, Operand::List(values)) => {
            if values.iter().all(|value| value.is_finite()) {
                Ok(())
            } else {
                Err(malformed(condition, "set members must be finite numbers"))
            }
        }
        (OpKind::In, Operand::Scalar(_)) => Err(malformed(condition, "expected a set of values")),
        (_, Operand::Scalar(value)) if value.is_finite() => Ok(()),
        (_, Operand::Scalar(_)) => Err(malformed(condition, "operand must be a finite number")),
        (_, Operand::List(_)) => Err(malformed(condition, "expected a single number")),
    }
}

/// Applies the operator. The operand must already have passed [`check_operand`];
/// a mismatched shape compares as false.
pub fn compare(op: OpKind, observed: f64, operand: &Operand) -> bool {
    match (op, operand) {
        (OpKind::Lt, Operand::Scalar(value)) => observed < *value,
        (OpKind::Le, Operand::Scalar(value)) => observed <= *value,
        (OpKind::Gt, Operand::Scalar(value)) => observed > *value,
        (OpKind::Ge, Operand::Scalar(value)) => observed >= *value,
        (OpKind::Eq, Operand::Scalar(value)) => (observed - value).abs() <= EQ_EPSILON,
        (OpKind::Between, Operand::List(bounds)) => match bounds.as_slice() {
            [low, high] => *low <= observed && observed <= *high,
            _ => false,
        },
        (OpKind::In, Operand::List(values)) => values
            .iter()
            .any(|value| (observed - value).abs() <= EQ_EPSILON),
        _ => false,
    }
}

/// Evaluates a leaf against an already resolved aggregate value.
pub fn evaluate(condition: &Condition, observed: f64) -> Result<bool, RuleError> {
    check_operand(condition)?;
    Ok(compare(condition.op, observed, &condition.value))
}

/// Evaluates a leaf and records the outcome. A failed aggregate never
/// matches; its failure is kept on the trace. The operand is checked even
/// then, so a malformed rule is reported regardless of the user's data.
pub fn evaluate_condition(
    condition: &Condition,
    aggregate: Result<f64, AggregateFailure>,
) -> Result<ConditionTrace, RuleError> {
    check_operand(condition)?;

    let (observed, result, failure) = match aggregate {
        Ok(value) => (
            Some(value),
            compare(condition.op, value, &condition.value),
            None,
        ),
        Err(failure) => (None, false, Some(failure)),
    };

    Ok(ConditionTrace {
        var: condition.var.clone(),
        agg: condition.agg,
        op: condition.op,
        operand: condition.value.clone(),
        observed,
        result,
        failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertline_protocol::rule::AggKind;
    use test_case::test_case;

    fn condition(op: OpKind, value: Operand) -> Condition {
        Condition::new("x", AggKind::Current, op, value)
    }

    #[test_case(OpKind::Lt, Operand::Scalar(5.0), 4.0, true)]
    #[test_case(OpKind::Lt, Operand::Scalar(5.0), 5.0, false)]
    #[test_case(OpKind::Le, Operand::Scalar(5.0), 5.0, true)]
    #[test_case(OpKind::Gt, Operand::Scalar(5.0), 7.0, true)]
    #[test_case(OpKind::Ge, Operand::Scalar(5.0), 4.999, false)]
    #[test_case(OpKind::Eq, Operand::Scalar(0.3), 0.1 + 0.2, true ; "eq tolerates rounding")]
    #[test_case(OpKind::Eq, Operand::Scalar(1.0), 1.001, false)]
    #[test_case(OpKind::Between, Operand::List(vec![6.0, 9.0]), 6.0, true ; "between is inclusive low")]
    #[test_case(OpKind::Between, Operand::List(vec![6.0, 9.0]), 9.0, true ; "between is inclusive high")]
    #[test_case(OpKind::Between, Operand::List(vec![6.0, 9.0]), 9.5, false)]
    #[test_case(OpKind::In, Operand::List(vec![1.0, 2.0, 3.0]), 2.0, true)]
    #[test_case(OpKind::In, Operand::List(vec![1.0, 2.0, 3.0]), 2.5, false)]
    fn applies_operators(op: OpKind, operand: Operand, observed: f64, expected: bool) {
        assert_eq!(evaluate(&condition(op, operand), observed).unwrap(), expected);
    }

    #[test_case(OpKind::Between, Operand::List(vec![9.0, 6.0]) ; "unordered range")]
    #[test_case(OpKind::Between, Operand::List(vec![1.0, 2.0, 3.0]) ; "three bounds")]
    #[test_case(OpKind::Between, Operand::Scalar(3.0) ; "scalar range")]
    #[test_case(OpKind::In, Operand::Scalar(3.0) ; "scalar set")]
    #[test_case(OpKind::Gt, Operand::List(vec![3.0]) ; "list comparison")]
    #[test_case(OpKind::Eq, Operand::Scalar(f64::NAN) ; "nan operand")]
    fn rejects_malformed_operands(op: OpKind, operand: Operand) {
        let err = evaluate(&condition(op, operand), 1.0).unwrap_err();
        assert!(matches!(err, RuleError::MalformedOperand { .. }));
    }

    #[test]
    fn failed_aggregate_never_matches() {
        let leaf = condition(OpKind::Lt, Operand::Scalar(100.0));
        let trace = evaluate_condition(
            &leaf,
            Err(AggregateFailure::MissingData {
                detail: "no history".into(),
            }),
        )
        .unwrap();

        assert!(!trace.result);
        assert_eq!(trace.observed, None);
        assert!(trace.failure.is_some());
    }

    #[test]
    fn malformed_operand_is_reported_without_data() {
        let leaf = condition(OpKind::Between, Operand::List(vec![2.0]));
        let err = evaluate_condition(
            &leaf,
            Err(AggregateFailure::InsufficientData {
                detail: "empty".into(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::MalformedOperand { .. }));
    }
}
