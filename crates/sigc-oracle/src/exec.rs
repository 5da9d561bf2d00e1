//! Invoking an external executable on one set of arguments.
//!
//! Protocol: the request `{"function": name, "args": {param: json}}` is
//! written to stdin. Exit 0 means stdout holds the JSON result. The
//! configured rejection exit code means the inputs were refused; the
//! reference may also exit with the type-error code when the case does not
//! type-check. Anything else is a crash.
//!
//! Every invocation runs in its own temporary working directory, and the
//! child is killed if its budget runs out.

use std::fmt;
use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use sigc_check::Args;

use crate::config::OracleConfig;

/// Which implementation an invocation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Reference,
    Generated,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Reference => write!(f, "reference"),
            Side::Generated => write!(f, "generated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub function: String,
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl Request {
    pub fn new(function: &str, args: &Args) -> Self {
        Request {
            function: function.to_string(),
            args: args
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        }
    }
}

/// What one invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Returned(serde_json::Value),
    Rejected { message: String },
    /// Reference only: the case is not well-typed.
    TypeError,
    Crashed { detail: String },
    TimedOut,
}

/// Classifies a finished process by exit code.
pub fn classify(
    code: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
    side: Side,
    config: &OracleConfig,
) -> ExecOutcome {
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    match code {
        Some(0) => match serde_json::from_slice(stdout) {
            Ok(value) => ExecOutcome::Returned(value),
            Err(e) => ExecOutcome::Crashed {
                detail: format!("stdout is not JSON: {e}"),
            },
        },
        Some(code) if code == config.rejection_exit_code => ExecOutcome::Rejected { message: stderr },
        Some(code) if side == Side::Reference && code == config.type_error_exit_code => {
            ExecOutcome::TypeError
        }
        Some(code) => ExecOutcome::Crashed {
            detail: if stderr.is_empty() {
                format!("exit code {code}")
            } else {
                format!("exit code {code}: {stderr}")
            },
        },
        None => ExecOutcome::Crashed {
            detail: "terminated by signal".to_string(),
        },
    }
}

/// Runs `executable` on one request under the configured timeout.
pub async fn invoke(
    executable: &Path,
    request: &Request,
    side: Side,
    config: &OracleConfig,
) -> ExecOutcome {
    let crashed = |detail: String| ExecOutcome::Crashed { detail };

    let workdir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => return crashed(format!("could not create working directory: {e}")),
    };
    let payload = match serde_json::to_vec(request) {
        Ok(payload) => payload,
        Err(e) => return crashed(format!("could not encode request: {e}")),
    };

    let mut child = match Command::new(executable)
        .current_dir(workdir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return crashed(format!("could not start {}: {e}", executable.display())),
    };

    let run = async move {
        if let Some(mut stdin) = child.stdin.take() {
            // The callee may exit without reading its input.
            let _ = stdin.write_all(&payload).await;
        }
        child.wait_with_output().await
    };

    let outcome = match tokio::time::timeout(config.case_timeout(), run).await {
        Ok(Ok(output)) => classify(
            output.status.code(),
            &output.stdout,
            &output.stderr,
            side,
            config,
        ),
        Ok(Err(e)) => crashed(format!("could not wait for process: {e}")),
        Err(_) => ExecOutcome::TimedOut,
    };

    match &outcome {
        ExecOutcome::Crashed { detail } => {
            warn!(%side, function = %request.function, detail = %detail, "process crashed")
        }
        ExecOutcome::TimedOut => warn!(
            %side,
            function = %request.function,
            timeout_ms = config.case_timeout_ms,
            "process timed out"
        ),
        _ => debug!(%side, function = %request.function, ?outcome, "process finished"),
    }
    outcome
}
