//! Property-based runs over a [`GeneratorSpec`].
//!
//! Each trial samples every generator variable from its range using a
//! seeded ChaCha8 PRNG, instantiates the templates and discards samples the
//! contract rejects. Accepted samples are run through the implementation
//! and every postcondition is checked on the result.
//!
//! Reproducibility: given the same seed, the same inputs are generated and
//! the same report is produced.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contracts::check::{check_invariants, check_postconditions, check_preconditions, Args};
use crate::contracts::{ContractCode, ContractViolation};
use crate::eval::error::EvalError;
use crate::eval::value::Value;

use super::template::{Assignment, GenVar};
use super::{EntryPoint, GeneratorSpec};

/// Outcome of a property run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyReport {
    pub trials_run: u32,
    /// Samples the contract accepted and the implementation ran on.
    pub accepted: u32,
    /// Samples outside the input space or rejected by the contract.
    pub discarded: u32,
    pub failures: Vec<PropertyFailure>,
    /// The seed used (for reproducibility).
    pub random_seed: u64,
}

/// A sample whose result broke a postcondition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFailure {
    pub inputs: Args,
    pub violation: ContractViolation,
}

/// Samples one variable. About 30% of draws take a boundary of the range.
fn sample_var(var: &GenVar, rng: &mut ChaCha8Rng) -> i64 {
    if var.min >= var.max {
        return var.min;
    }
    if rng.gen_ratio(3, 10) {
        let mut boundaries = vec![var.min, var.min + 1, var.max];
        if var.min < 0 && var.max > 0 {
            boundaries.push(0);
        }
        boundaries[rng.gen_range(0..boundaries.len())]
    } else {
        rng.gen_range(var.min..=var.max)
    }
}

/// The inputs of every trial, `None` where the sample is not an inhabitant.
pub fn generate_inputs(spec: &GeneratorSpec) -> Vec<Option<Args>> {
    let mut rng = ChaCha8Rng::seed_from_u64(spec.seed);
    (0..spec.trials)
        .map(|_| {
            let assignment: Assignment = spec
                .variables
                .iter()
                .map(|var| (var.name.clone(), sample_var(var, &mut rng)))
                .collect();
            spec.templates
                .iter()
                .map(|(name, template)| Some((name.clone(), template.instantiate(&assignment)?)))
                .collect::<Option<Args>>()
        })
        .collect()
}

fn admitted(code: &ContractCode, entry: &EntryPoint, inputs: &Args) -> Result<bool, EvalError> {
    let checked = match entry {
        EntryPoint::Function => check_preconditions(code, inputs),
        EntryPoint::Constructor(record) => match inputs.get("self") {
            Some(value) => check_invariants(code, record, value),
            None => Ok(Vec::new()),
        },
    };
    match checked {
        Ok(violations) => Ok(violations.is_empty()),
        Err(err) if err.is_defect() => Err(err),
        Err(_) => Ok(false),
    }
}

/// Generated inputs the contract accepts, in trial order.
pub fn accepted_samples(
    spec: &GeneratorSpec,
    code: &ContractCode,
    entry: &EntryPoint,
) -> Result<Vec<Args>, EvalError> {
    let mut accepted = Vec::new();
    for inputs in generate_inputs(spec).into_iter().flatten() {
        if admitted(code, entry, &inputs)? {
            accepted.push(inputs);
        }
    }
    Ok(accepted)
}

/// Runs a property case against an implementation.
///
/// For constructor entry points only admission is checked: a generated
/// value either satisfies the invariants or is discarded.
pub fn run_property<F>(
    spec: &GeneratorSpec,
    entry: &EntryPoint,
    code: &ContractCode,
    body: F,
) -> Result<PropertyReport, EvalError>
where
    F: Fn(&Args) -> Value,
{
    let mut report = PropertyReport {
        trials_run: 0,
        accepted: 0,
        discarded: 0,
        failures: Vec::new(),
        random_seed: spec.seed,
    };

    for inputs in generate_inputs(spec) {
        report.trials_run += 1;
        let Some(inputs) = inputs else {
            report.discarded += 1;
            continue;
        };
        if !admitted(code, entry, &inputs)? {
            report.discarded += 1;
            continue;
        }
        report.accepted += 1;
        if *entry != EntryPoint::Function {
            continue;
        }
        let result = body(&inputs);
        for violation in check_postconditions(code, &inputs, &result)? {
            report.failures.push(PropertyFailure {
                inputs: inputs.clone(),
                violation,
            });
        }
    }

    debug!(
        trials = report.trials_run,
        accepted = report.accepted,
        failures = report.failures.len(),
        seed = report.random_seed,
        "property run finished"
    );
    Ok(report)
}
