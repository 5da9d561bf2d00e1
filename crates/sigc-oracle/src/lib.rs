pub mod config;
pub mod error;
pub mod exec;
pub mod runner;

// Re-export commonly used types
pub use config::OracleConfig;
pub use error::OracleError;
pub use exec::{ExecOutcome, Side};
pub use runner::{record_reference_outputs, CaseOutcome, CaseReport, Oracle, OracleReport};
