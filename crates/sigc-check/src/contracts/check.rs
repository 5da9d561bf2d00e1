//! Contract checking: run synthesized checks against concrete values and
//! produce violations.
//!
//! Preconditions run at function entry, postconditions after the body has
//! produced its result, invariants whenever a record value is constructed.

use indexmap::IndexMap;
use tracing::debug;

use crate::contracts::{CheckStmt, ContractCode, ContractKind, ContractViolation};
use crate::eval::error::EvalError;
use crate::eval::value::Value;
use crate::eval::{run_checks, Env};

/// Arguments by source parameter name.
pub type Args = IndexMap<String, Value>;

fn bind_args(code: &ContractCode, args: &Args) -> Env {
    let mut env = Env::new();
    for param in &code.params {
        if let Some(value) = args.get(&param.source) {
            env.bind(param.source.clone(), value.clone());
        }
    }
    env
}

fn violations(
    kind: ContractKind,
    checks: &[CheckStmt],
    env: &mut Env,
    inputs: &Args,
    actual_return: Option<&Value>,
) -> Result<Vec<ContractViolation>, EvalError> {
    Ok(run_checks(checks, env)?
        .into_iter()
        .map(|failure| ContractViolation {
            kind,
            constraint: failure.constraint,
            message: failure.message,
            inputs: inputs.clone(),
            actual_return: actual_return.cloned(),
        })
        .collect())
}

/// Check all preconditions for a call.
///
/// Returns the violations in check order (empty = all passed); the first
/// one is the most primitive violated constraint.
pub fn check_preconditions(
    code: &ContractCode,
    args: &Args,
) -> Result<Vec<ContractViolation>, EvalError> {
    let mut env = bind_args(code, args);
    violations(
        ContractKind::Precondition,
        &code.preconditions,
        &mut env,
        args,
        None,
    )
}

/// Check all postconditions against the returned value.
///
/// Every postcondition is evaluated; a failure does not stop later checks.
pub fn check_postconditions(
    code: &ContractCode,
    args: &Args,
    return_value: &Value,
) -> Result<Vec<ContractViolation>, EvalError> {
    let mut env = bind_args(code, args);
    env.bind(code.result_name.clone(), return_value.clone());
    violations(
        ContractKind::Postcondition,
        &code.postconditions,
        &mut env,
        args,
        Some(return_value),
    )
}

/// Check the invariants of a named record against a constructed value.
///
/// Records without invariants always pass.
pub fn check_invariants(
    code: &ContractCode,
    record: &str,
    value: &Value,
) -> Result<Vec<ContractViolation>, EvalError> {
    let Some(invariant) = code.invariant(record) else {
        return Ok(Vec::new());
    };
    let mut env = Env::new();
    env.bind("self", value.clone());
    let mut inputs = Args::new();
    inputs.insert("self".to_string(), value.clone());
    violations(
        ContractKind::Invariant,
        &invariant.checks,
        &mut env,
        &inputs,
        None,
    )
}

/// Outcome of calling a contracted function.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// A precondition failed; the body never ran.
    Rejected(Vec<ContractViolation>),
    /// The body ran. `violations` lists failed postconditions.
    Returned {
        value: Value,
        violations: Vec<ContractViolation>,
    },
}

impl Invocation {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Invocation::Rejected(_))
    }

    /// The first violation of either phase.
    pub fn first_violation(&self) -> Option<&ContractViolation> {
        match self {
            Invocation::Rejected(violations) => violations.first(),
            Invocation::Returned { violations, .. } => violations.first(),
        }
    }
}

/// An implementation wrapped in its synthesized contracts, standing in for
/// generated target code.
pub struct ContractedFn<F> {
    code: ContractCode,
    body: F,
}

impl<F> ContractedFn<F>
where
    F: Fn(&Args) -> Value,
{
    pub fn new(code: ContractCode, body: F) -> Self {
        ContractedFn { code, body }
    }

    pub fn code(&self) -> &ContractCode {
        &self.code
    }

    /// Runs the body without any checks.
    pub fn run_body(&self, args: &Args) -> Value {
        (self.body)(args)
    }

    /// Checks preconditions, runs the body, then checks postconditions.
    pub fn call(&self, args: &Args) -> Result<Invocation, EvalError> {
        let rejected = check_preconditions(&self.code, args)?;
        if !rejected.is_empty() {
            debug!(
                function = %self.code.source_name,
                constraint = %rejected[0].constraint,
                "call rejected"
            );
            return Ok(Invocation::Rejected(rejected));
        }
        let value = (self.body)(args);
        let violations = check_postconditions(&self.code, args, &value)?;
        Ok(Invocation::Returned { value, violations })
    }
}
