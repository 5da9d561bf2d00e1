pub mod contracts;
pub mod eval;
pub mod extract;
pub mod fingerprint;
pub mod model;
pub mod pipeline;
pub mod testgen;

// Re-export commonly used types
pub use contracts::check::{
    check_invariants, check_postconditions, check_preconditions, Args, ContractedFn, Invocation,
};
pub use contracts::profile::EmissionProfile;
pub use contracts::synth::{synthesize, SynthesisError};
pub use contracts::{ContractCode, ContractKind, ContractViolation};
pub use eval::error::EvalError;
pub use eval::value::Value;
pub use extract::extract;
pub use fingerprint::{content_fingerprint, is_stale, source_fingerprint, Fingerprint};
pub use model::{Constraint, ConstraintKind, ConstraintModel, Scope};
pub use pipeline::{
    compile_batch, compile_one, BatchEntry, CompiledSignature, PipelineError, SignatureFailure,
    Stage,
};
pub use testgen::{
    synthesize_tests, CaseKind, EntryPoint, ExpectedOutcome, TestCase, TestInputs, TestPlan,
    TestPlanConfig,
};
