//! Batch compilation: signature text in, contracts and test plans out.
//!
//! Every signature is processed independently on the rayon pool. A failure
//! is recorded against its label and never aborts the rest of the batch.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sigc_core::{parse_signature, Signature, SignatureError};

use crate::contracts::profile::EmissionProfile;
use crate::contracts::synth::{synthesize, SynthesisError};
use crate::contracts::ContractCode;
use crate::eval::error::EvalError;
use crate::extract::extract;
use crate::model::ConstraintModel;
use crate::testgen::{synthesize_tests, TestPlan, TestPlanConfig};

/// Errors that stop one signature from compiling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("test synthesis failed: {0}")]
    Eval(#[from] EvalError),
}

/// The step a signature failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Parse,
    Extract,
    Contracts,
    Tests,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Parse => "parse",
            Stage::Extract => "extract",
            Stage::Contracts => "contracts",
            Stage::Tests => "tests",
        })
    }
}

/// Every artifact derived from one signature.
#[derive(Debug, Clone)]
pub struct CompiledSignature {
    pub label: String,
    pub signature: Signature,
    pub model: ConstraintModel,
    pub contract: ContractCode,
    pub plan: TestPlan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureFailure {
    pub label: String,
    pub stage: Stage,
    pub error: PipelineError,
}

/// One batch entry, in input order.
#[derive(Debug, Clone)]
pub enum BatchEntry {
    Compiled(Box<CompiledSignature>),
    Failed(SignatureFailure),
}

impl BatchEntry {
    pub fn label(&self) -> &str {
        match self {
            BatchEntry::Compiled(compiled) => &compiled.label,
            BatchEntry::Failed(failure) => &failure.label,
        }
    }

    pub fn failure(&self) -> Option<&SignatureFailure> {
        match self {
            BatchEntry::Compiled(_) => None,
            BatchEntry::Failed(failure) => Some(failure),
        }
    }
}

/// Runs the whole pipeline on one signature.
pub fn compile_one(
    label: &str,
    source: &str,
    profile: &EmissionProfile,
    config: &TestPlanConfig,
) -> Result<CompiledSignature, SignatureFailure> {
    let fail = |stage: Stage, error: PipelineError| SignatureFailure {
        label: label.to_string(),
        stage,
        error,
    };

    let signature = parse_signature(source).map_err(|e| fail(Stage::Parse, e.into()))?;
    let model = extract(&signature).map_err(|e| fail(Stage::Extract, e.into()))?;
    let contract =
        synthesize(&signature, &model, profile).map_err(|e| fail(Stage::Contracts, e.into()))?;
    let plan = synthesize_tests(&signature, &model, &contract, config)
        .map_err(|e| fail(Stage::Tests, e.into()))?;

    debug!(
        label,
        constraints = model.constraints.len(),
        cases = plan.cases.len(),
        gaps = plan.gaps.len(),
        "signature compiled"
    );
    Ok(CompiledSignature {
        label: label.to_string(),
        signature,
        model,
        contract,
        plan,
    })
}

/// Compiles `(label, source)` pairs in parallel. Results keep input order.
pub fn compile_batch(
    sources: &[(String, String)],
    profile: &EmissionProfile,
    config: &TestPlanConfig,
) -> Vec<BatchEntry> {
    let entries: Vec<BatchEntry> = sources
        .par_iter()
        .map(|(label, source)| match compile_one(label, source, profile, config) {
            Ok(compiled) => BatchEntry::Compiled(Box::new(compiled)),
            Err(failure) => {
                warn!(
                    label = %failure.label,
                    stage = %failure.stage,
                    error = %failure.error,
                    "signature failed"
                );
                BatchEntry::Failed(failure)
            }
        })
        .collect();

    let failed = entries.iter().filter(|e| e.failure().is_some()).count();
    info!(
        "Batch: {} compiled, {} failed",
        entries.len() - failed,
        failed
    );
    entries
}

/// Splits `---`-separated signature text into labelled sources.
///
/// A chunk is labelled by the function name on its `->` line when one can
/// be read, otherwise by its position.
pub fn split_sources(text: &str) -> Vec<(String, String)> {
    text.split("\n---")
        .map(|chunk| chunk.trim_start_matches('-').trim())
        .filter(|chunk| !chunk.is_empty())
        .enumerate()
        .map(|(i, chunk)| (chunk_label(chunk, i), chunk.to_string()))
        .collect()
}

fn chunk_label(chunk: &str, index: usize) -> String {
    let head = chunk
        .lines()
        .map(str::trim)
        .find(|line| line.contains("->"))
        .unwrap_or_default();
    let name = head
        .split('(')
        .next()
        .and_then(|prefix| prefix.split_whitespace().last())
        .unwrap_or_default();
    if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("#{}", index + 1)
    }
}
