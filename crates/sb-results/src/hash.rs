//! Content hashing for cache keys and sweep fingerprints.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// File-safe key for a model/executable pair.
pub fn cache_key(model: &str, executable: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(executable.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Digest of the JSON form of `params`.
pub fn fingerprint<T: Serialize>(params: &T) -> String {
    let mut hasher = Sha256::new();
    let json = serde_json::to_string(params).unwrap_or_default();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}
