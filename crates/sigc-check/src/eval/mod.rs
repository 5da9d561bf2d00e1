//! In-process evaluator for synthesized checks.
//!
//! Interprets [`CheckStmt`]s against [`Value`]s so contracts can be exercised
//! without emitting target code: the test synthesizer uses it to validate
//! candidate inputs and the runner uses it to check an implementation.

pub mod error;
pub mod value;

use tracing::{debug, error};

use sigc_core::{BinOp, ConstraintId, UnOp};

use crate::contracts::{CheckExpr, CheckStmt};

use self::error::EvalError;
use self::value::Value;

/// Variable bindings, innermost last.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: Vec<(String, Value)>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.vars.push((name.into(), value));
    }

    fn pop(&mut self) {
        self.vars.pop();
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.vars
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
    }
}

/// A failed check: the constraint and its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub constraint: ConstraintId,
    pub message: String,
}

/// Runs every check in order and returns the failures, first = earliest in
/// check order. A constraint fails at most once even when it is checked
/// per element.
///
/// An evaluation error is propagated unless an earlier check already
/// failed, in which case the erroring check is skipped: its inputs are
/// already known to be invalid. Defects (`UnreachableCase`) always
/// propagate.
pub fn run_checks(stmts: &[CheckStmt], env: &mut Env) -> Result<Vec<Failure>, EvalError> {
    let mut failures = Vec::new();
    for stmt in stmts {
        if let Err(err) = run_stmt(stmt, env, &mut failures) {
            if err.is_defect() || failures.is_empty() {
                return Err(err);
            }
            debug!(error = %err, "check skipped after earlier failure");
        }
    }
    Ok(failures)
}

fn record(failures: &mut Vec<Failure>, constraint: ConstraintId, message: &str) {
    if !failures.iter().any(|f| f.constraint == constraint) {
        failures.push(Failure {
            constraint,
            message: message.to_string(),
        });
    }
}

fn run_stmt(stmt: &CheckStmt, env: &mut Env, failures: &mut Vec<Failure>) -> Result<(), EvalError> {
    match stmt {
        CheckStmt::Assert {
            constraint,
            condition,
            message,
        } => match eval(condition, env, *constraint)? {
            Value::Bool(true) => Ok(()),
            Value::Bool(false) => {
                record(failures, *constraint, message);
                Ok(())
            }
            other => Err(EvalError::TypeMismatch {
                constraint: *constraint,
                expected: "Bool".into(),
                got: other.type_name().into(),
            }),
        },

        CheckStmt::ForEach {
            constraint,
            sequence,
            binder,
            body,
        } => {
            let items = match eval(sequence, env, *constraint)? {
                Value::Seq(items) => items,
                other => {
                    return Err(EvalError::TypeMismatch {
                        constraint: *constraint,
                        expected: "Sequence".into(),
                        got: other.type_name().into(),
                    })
                }
            };
            for item in items {
                env.bind(binder.clone(), item);
                let result = body.iter().try_for_each(|s| run_stmt(s, env, failures));
                env.pop();
                result?;
            }
            Ok(())
        }

        CheckStmt::MatchOptional {
            constraint,
            subject,
            binder,
            on_absent,
            on_present,
            fallback,
        } => match eval(subject, env, *constraint)? {
            Value::Absent => on_absent.iter().try_for_each(|s| run_stmt(s, env, failures)),
            Value::Present(inner) => {
                env.bind(binder.clone(), *inner);
                let result = on_present.iter().try_for_each(|s| run_stmt(s, env, failures));
                env.pop();
                result
            }
            other => match fallback {
                Some(fallback) => {
                    error!(
                        constraint = %constraint,
                        got = other.type_name(),
                        "UnreachableCaseError: optional discriminant matched no branch"
                    );
                    Err(EvalError::UnreachableCase {
                        constraint: *constraint,
                        message: fallback.message.clone(),
                    })
                }
                None => Err(EvalError::TypeMismatch {
                    constraint: *constraint,
                    expected: "Optional".into(),
                    got: other.type_name().into(),
                }),
            },
        },
    }
}

fn int(value: Value, constraint: ConstraintId) -> Result<i64, EvalError> {
    match value {
        Value::Int(v) => Ok(v),
        other => Err(EvalError::TypeMismatch {
            constraint,
            expected: "Int".into(),
            got: other.type_name().into(),
        }),
    }
}

fn boolean(value: Value, constraint: ConstraintId) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::TypeMismatch {
            constraint,
            expected: "Bool".into(),
            got: other.type_name().into(),
        }),
    }
}

/// Evaluates a check expression.
pub fn eval(expr: &CheckExpr, env: &Env, constraint: ConstraintId) -> Result<Value, EvalError> {
    match expr {
        CheckExpr::Int(v) => Ok(Value::Int(*v)),
        CheckExpr::Bool(b) => Ok(Value::Bool(*b)),

        CheckExpr::Var { name, fields } => {
            let mut current = env
                .lookup(name)
                .ok_or_else(|| EvalError::UnboundSymbol {
                    constraint,
                    name: name.clone(),
                })?;
            for field in fields {
                current = match current {
                    Value::Record(record) => {
                        record.get(field).ok_or_else(|| EvalError::MissingField {
                            constraint,
                            field: field.clone(),
                        })?
                    }
                    other => {
                        return Err(EvalError::TypeMismatch {
                            constraint,
                            expected: "Record".into(),
                            got: other.type_name().into(),
                        })
                    }
                };
            }
            Ok(current.clone())
        }

        CheckExpr::Len(inner) => match eval(inner, env, constraint)? {
            Value::Seq(items) => Ok(Value::Int(items.len() as i64)),
            Value::Text(text) => Ok(Value::Int(text.chars().count() as i64)),
            other => Err(EvalError::TypeMismatch {
                constraint,
                expected: "Sequence".into(),
                got: other.type_name().into(),
            }),
        },

        CheckExpr::Unary(UnOp::Neg, inner) => {
            let v = int(eval(inner, env, constraint)?, constraint)?;
            v.checked_neg()
                .map(Value::Int)
                .ok_or(EvalError::Overflow { constraint })
        }
        CheckExpr::Unary(UnOp::Not, inner) => {
            Ok(Value::Bool(!boolean(eval(inner, env, constraint)?, constraint)?))
        }

        CheckExpr::Binary(op, lhs, rhs) => binary(*op, lhs, rhs, env, constraint),
    }
}

fn binary(
    op: BinOp,
    lhs: &CheckExpr,
    rhs: &CheckExpr,
    env: &Env,
    constraint: ConstraintId,
) -> Result<Value, EvalError> {
    let operand = |expr: &CheckExpr| eval(expr, env, constraint);
    let overflow = EvalError::Overflow { constraint };
    let value = match op {
        // && and || short-circuit.
        BinOp::And => {
            boolean(operand(lhs)?, constraint)? && boolean(operand(rhs)?, constraint)?
        }
        BinOp::Or => {
            boolean(operand(lhs)?, constraint)? || boolean(operand(rhs)?, constraint)?
        }
        BinOp::Eq => operand(lhs)? == operand(rhs)?,
        BinOp::Ne => operand(lhs)? != operand(rhs)?,
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let a = int(operand(lhs)?, constraint)?;
            let b = int(operand(rhs)?, constraint)?;
            match op {
                BinOp::Lt => a < b,
                BinOp::Le => a <= b,
                BinOp::Gt => a > b,
                _ => a >= b,
            }
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
            let a = int(operand(lhs)?, constraint)?;
            let b = int(operand(rhs)?, constraint)?;
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                _ if b == 0 => return Err(EvalError::DivideByZero { constraint }),
                BinOp::Div => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            return result.map(Value::Int).ok_or(overflow);
        }
    };
    Ok(Value::Bool(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::UnreachableFallback;

    fn assert_stmt(id: u32, condition: CheckExpr) -> CheckStmt {
        CheckStmt::Assert {
            constraint: ConstraintId(id),
            condition,
            message: format!("C{id} failed"),
        }
    }

    fn ge_zero(name: &str) -> CheckExpr {
        CheckExpr::binary(BinOp::Ge, CheckExpr::var(name), CheckExpr::Int(0))
    }

    #[test]
    fn failures_are_reported_in_check_order() {
        let stmts = vec![assert_stmt(2, ge_zero("n")), assert_stmt(1, ge_zero("k"))];
        let mut env = Env::new();
        env.bind("n", Value::Int(-1));
        env.bind("k", Value::Int(-5));
        let failures = run_checks(&stmts, &mut env).unwrap();
        let ids: Vec<_> = failures.iter().map(|f| f.constraint).collect();
        assert_eq!(ids, vec![ConstraintId(2), ConstraintId(1)]);
    }

    #[test]
    fn per_element_failure_is_reported_once() {
        let stmts = vec![CheckStmt::ForEach {
            constraint: ConstraintId(1),
            sequence: CheckExpr::var("xs"),
            binder: "elem0".into(),
            body: vec![assert_stmt(1, ge_zero("elem0"))],
        }];
        let mut env = Env::new();
        env.bind("xs", Value::seq_of_ints([-1, 2, -3]));
        let failures = run_checks(&stmts, &mut env).unwrap();
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn error_after_failure_is_skipped() {
        let division = CheckExpr::binary(
            BinOp::Gt,
            CheckExpr::binary(BinOp::Div, CheckExpr::Int(10), CheckExpr::var("d")),
            CheckExpr::Int(0),
        );
        let stmts = vec![assert_stmt(1, ge_zero("n")), assert_stmt(2, division)];
        let mut env = Env::new();
        env.bind("n", Value::Int(-1));
        env.bind("d", Value::Int(0));
        let failures = run_checks(&stmts, &mut env).unwrap();
        assert_eq!(failures.len(), 1);

        let mut env = Env::new();
        env.bind("n", Value::Int(1));
        env.bind("d", Value::Int(0));
        assert_eq!(
            run_checks(&stmts, &mut env),
            Err(EvalError::DivideByZero {
                constraint: ConstraintId(2)
            })
        );
    }

    #[test]
    fn malformed_discriminant_hits_fallback() {
        let stmts = vec![CheckStmt::MatchOptional {
            constraint: ConstraintId(1),
            subject: CheckExpr::var("x"),
            binder: "value0".into(),
            on_absent: vec![],
            on_present: vec![assert_stmt(2, ge_zero("value0"))],
            fallback: Some(UnreachableFallback {
                message: "x is neither absent nor present".into(),
            }),
        }];
        let mut env = Env::new();
        env.bind("x", Value::Int(3));
        let err = run_checks(&stmts, &mut env).unwrap_err();
        assert!(err.is_defect());

        let mut env = Env::new();
        env.bind("x", Value::Present(Box::new(Value::Int(-2))));
        let failures = run_checks(&stmts, &mut env).unwrap();
        assert_eq!(failures[0].constraint, ConstraintId(2));
    }

    #[test]
    fn field_access_and_length() {
        let mut fields = indexmap::IndexMap::new();
        fields.insert("rows".to_string(), Value::Int(2));
        fields.insert("data".to_string(), Value::seq_of_ints([1, 2]));
        let mut env = Env::new();
        env.bind("m", Value::Record(fields));
        let expr = CheckExpr::binary(
            BinOp::Eq,
            CheckExpr::len(CheckExpr::Var {
                name: "m".into(),
                fields: vec!["data".into()],
            }),
            CheckExpr::Var {
                name: "m".into(),
                fields: vec!["rows".into()],
            },
        );
        assert_eq!(eval(&expr, &env, ConstraintId(1)), Ok(Value::Bool(true)));
    }

    #[test]
    fn overflow_is_an_error() {
        let mut env = Env::new();
        env.bind("n", Value::Int(i64::MAX));
        let expr = CheckExpr::binary(BinOp::Add, CheckExpr::var("n"), CheckExpr::Int(1));
        assert_eq!(
            eval(&expr, &env, ConstraintId(4)),
            Err(EvalError::Overflow {
                constraint: ConstraintId(4)
            })
        );
    }

    #[test]
    fn every_operator_evaluates() {
        let mut env = Env::new();
        env.bind("a", Value::Int(7));
        env.bind("b", Value::Int(2));
        let op = |op: BinOp| {
            eval(
                &CheckExpr::binary(op, CheckExpr::var("a"), CheckExpr::var("b")),
                &env,
                ConstraintId(1),
            )
        };
        assert_eq!(op(BinOp::Add), Ok(Value::Int(9)));
        assert_eq!(op(BinOp::Sub), Ok(Value::Int(5)));
        assert_eq!(op(BinOp::Mul), Ok(Value::Int(14)));
        assert_eq!(op(BinOp::Div), Ok(Value::Int(3)));
        assert_eq!(op(BinOp::Rem), Ok(Value::Int(1)));
        assert_eq!(op(BinOp::Lt), Ok(Value::Bool(false)));
        assert_eq!(op(BinOp::Le), Ok(Value::Bool(false)));
        assert_eq!(op(BinOp::Gt), Ok(Value::Bool(true)));
        assert_eq!(op(BinOp::Ge), Ok(Value::Bool(true)));
        assert_eq!(op(BinOp::Eq), Ok(Value::Bool(false)));
        assert_eq!(op(BinOp::Ne), Ok(Value::Bool(true)));
        assert!(matches!(op(BinOp::And), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let env = Env::new();
        let divide_by_zero = CheckExpr::binary(
            BinOp::Eq,
            CheckExpr::binary(BinOp::Div, CheckExpr::Int(1), CheckExpr::Int(0)),
            CheckExpr::Int(0),
        );
        let and = CheckExpr::binary(BinOp::And, CheckExpr::Bool(false), divide_by_zero.clone());
        assert_eq!(eval(&and, &env, ConstraintId(2)), Ok(Value::Bool(false)));
        let or = CheckExpr::binary(BinOp::Or, CheckExpr::Bool(true), divide_by_zero.clone());
        assert_eq!(eval(&or, &env, ConstraintId(2)), Ok(Value::Bool(true)));
        assert_eq!(
            eval(&divide_by_zero, &env, ConstraintId(2)),
            Err(EvalError::DivideByZero {
                constraint: ConstraintId(2)
            })
        );
    }
}
