//! sb-results: run artifacts and the sweep cache.

pub mod atomic;
pub mod cache;
pub mod hash;
pub mod naming;
pub mod store;
pub mod types;
pub mod validate;

pub use cache::{CacheDocument, CacheEntry, SweepCache};
pub use hash::{cache_key, fingerprint};
pub use naming::{display_name, new_run_date, new_run_id, parse_timestamp};
pub use store::RunArtifactStore;
pub use types::*;
pub use validate::{InvalidReason, InvalidRun, validate_execution, validate_pair};

use std::path::PathBuf;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run artifact root does not exist: {}", path.display())]
    RootMissing { path: PathBuf },

    #[error("Refusing to write {0}")]
    InvalidArtifact(InvalidRun),

    #[error("Corrupt cache entry {}: {message}", path.display())]
    CorruptCacheEntry { path: PathBuf, message: String },
}
