//! Oracle configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits and exit-code conventions for executable invocations.
///
/// Loaded from JSON by the driver; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Wall-clock budget per invocation, in milliseconds.
    pub case_timeout_ms: u64,
    /// Cases executing at the same time.
    pub max_concurrency: usize,
    /// Exit code signalling an explicit rejection of the inputs.
    pub rejection_exit_code: i32,
    /// Exit code the reference uses when a case does not type-check.
    pub type_error_exit_code: i32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            case_timeout_ms: 5_000,
            max_concurrency: 4,
            rejection_exit_code: 2,
            type_error_exit_code: 3,
        }
    }
}

impl OracleConfig {
    pub fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.case_timeout_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout_ms = timeout.as_millis() as u64;
        self
    }
}
