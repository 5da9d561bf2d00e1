//! In-process execution of a [`TestPlan`] against an implementation.
//!
//! The implementation is a Rust closure standing in for generated target
//! code; it is wrapped in the synthesized contracts and every case is run
//! through them. Reference outputs recorded on a case are compared by their
//! JSON wire form.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::contracts::check::{check_invariants, Args, ContractedFn, Invocation};
use crate::contracts::{ContractCode, ContractViolation};
use crate::eval::error::EvalError;
use crate::eval::value::Value;

use super::property::run_property;
use super::{EntryPoint, ExpectedOutcome, Isolation, TestCase, TestInputs, TestPlan};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaseStatus {
    Passed,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case: String,
    pub name: String,
    pub status: CaseStatus,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

/// Runs every case of `plan`. One failing case never stops the rest; only
/// a defect in the synthesized checks is returned as an error.
pub fn run_plan<F>(plan: &TestPlan, code: &ContractCode, body: F) -> Result<Vec<CaseResult>, EvalError>
where
    F: Fn(&Args) -> Value,
{
    let contracted = ContractedFn::new(code.clone(), body);
    let mut results = Vec::with_capacity(plan.cases.len());
    for case in &plan.cases {
        let status = match run_case(case, &contracted) {
            Ok(status) => status,
            Err(err) if err.is_defect() => return Err(err),
            Err(err) => CaseStatus::Failed {
                reason: format!("check could not be evaluated: {err}"),
            },
        };
        if let CaseStatus::Failed { reason } = &status {
            warn!(case = %case.id, name = %case.name, reason = %reason, "test case failed");
        }
        results.push(CaseResult {
            case: case.id.clone(),
            name: case.name.clone(),
            status,
        });
    }
    Ok(results)
}

fn failed(reason: impl Into<String>) -> CaseStatus {
    CaseStatus::Failed {
        reason: reason.into(),
    }
}

fn check_rejection(
    case: &TestCase,
    expected: sigc_core::ConstraintId,
    violations: &[ContractViolation],
) -> CaseStatus {
    match violations.first() {
        None => failed(format!("expected rejection by {expected}, inputs were accepted")),
        Some(first) if first.constraint != expected => failed(format!(
            "expected rejection by {expected}, first violation was {}",
            first.constraint
        )),
        Some(_) if case.isolation == Isolation::Exact && violations.len() > 1 => failed(format!(
            "expected {expected} to be the only violation, got {}",
            violations.len()
        )),
        Some(_) => CaseStatus::Passed,
    }
}

fn run_case<F>(case: &TestCase, contracted: &ContractedFn<F>) -> Result<CaseStatus, EvalError>
where
    F: Fn(&Args) -> Value,
{
    let code = contracted.code();
    let inputs = match &case.inputs {
        TestInputs::Literal(args) => args,
        TestInputs::Generator(spec) => {
            let report = run_property(spec, &case.entry, code, |args| contracted.run_body(args))?;
            return Ok(if let Some(failure) = report.failures.first() {
                failed(format!(
                    "{} of {} accepted samples failed; first: {}",
                    report.failures.len(),
                    report.accepted,
                    failure.violation.message
                ))
            } else if report.accepted == 0 {
                failed(format!("no accepted sample in {} trials", report.trials_run))
            } else {
                CaseStatus::Passed
            });
        }
    };

    if let EntryPoint::Constructor(record) = &case.entry {
        let value = inputs.get("self").cloned().unwrap_or(Value::Absent);
        let violations = check_invariants(code, record, &value)?;
        return Ok(match &case.expected {
            ExpectedOutcome::Reject { constraint, .. } => {
                check_rejection(case, *constraint, &violations)
            }
            _ if violations.is_empty() => CaseStatus::Passed,
            _ => failed(format!("invariant failed: {}", violations[0].message)),
        });
    }

    let outcome = contracted.call(inputs)?;
    Ok(match (&case.expected, outcome) {
        (ExpectedOutcome::Reject { constraint, .. }, Invocation::Rejected(violations)) => {
            check_rejection(case, *constraint, &violations)
        }
        (ExpectedOutcome::Reject { constraint, .. }, Invocation::Returned { .. }) => {
            failed(format!("expected rejection by {constraint}, inputs were accepted"))
        }
        (_, Invocation::Rejected(violations)) => failed(format!(
            "inputs were rejected: {}",
            violations
                .first()
                .map(|v| v.message.as_str())
                .unwrap_or_default()
        )),
        (_, Invocation::Returned { value, violations }) => {
            if let Some(violation) = violations.first() {
                failed(format!("postcondition failed: {}", violation.message))
            } else {
                match &case.reference_output {
                    Some(reference) if *reference != value.to_json() => failed(format!(
                        "result {} differs from reference {reference}",
                        value.to_json()
                    )),
                    _ => CaseStatus::Passed,
                }
            }
        }
    })
}
