use std::path::PathBuf;

use thiserror::Error;

use sigc_check::EvalError;

/// Errors that prevent an oracle run from starting or finishing.
///
/// Per-case problems (crashes, timeouts, mismatches) are not errors; they
/// are reported as [`crate::CaseOutcome`]s.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("executable not found: {path}")]
    MissingExecutable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not expand property case: {0}")]
    Eval(#[from] EvalError),

    #[error("case task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
