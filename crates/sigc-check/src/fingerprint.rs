//! Deterministic fingerprints using blake3.
//!
//! Two uses:
//!
//! - **Source fingerprints** tie a derived artifact (contract, test plan) to
//!   the exact signature text it came from. An artifact whose fingerprint
//!   differs from the current text is stale and must be recomputed; there
//!   is no incremental patching.
//! - **Content fingerprints** hash an artifact's canonical JSON
//!   (`serde_json::to_vec`), so two syntheses can be compared for
//!   byte-identical output.
//!
//! Every hashed structure uses `Vec`/`IndexMap`, never `HashMap`, so its JSON
//! is deterministic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hex-encoded blake3 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Fingerprint {
    /// Short prefix for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

/// Fingerprint of signature source text.
pub fn source_fingerprint(text: &str) -> Fingerprint {
    Fingerprint(blake3::hash(text.as_bytes()).to_hex().to_string())
}

/// Fingerprint of an artifact's canonical JSON serialization.
pub fn content_fingerprint<T: Serialize>(value: &T) -> Result<Fingerprint, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Fingerprint(blake3::hash(&bytes).to_hex().to_string()))
}

/// True when an artifact built from `artifact` no longer matches `current_text`.
pub fn is_stale(artifact: &Fingerprint, current_text: &str) -> bool {
    *artifact != source_fingerprint(current_text)
}
