//! Error types for the sb-app service layer.

use std::path::PathBuf;

/// Application error type that wraps errors from the backend crates so
/// front ends deal with a single error surface.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to read config file: {path}")]
    ConfigFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Results error: {0}")]
    Results(String),

    #[error("Sweep error: {0}")]
    Sweep(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Unknown {kind}: {name}")]
    UnknownName { kind: &'static str, name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sb-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<sb_project::ProjectError> for AppError {
    fn from(err: sb_project::ProjectError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sb_results::ResultsError> for AppError {
    fn from(err: sb_results::ResultsError) -> Self {
        AppError::Results(err.to_string())
    }
}

impl From<sb_sweep::SweepError> for AppError {
    fn from(err: sb_sweep::SweepError) -> Self {
        AppError::Sweep(err.to_string())
    }
}
