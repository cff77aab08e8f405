//! sb-project: sweep configuration format and validation.

pub mod schema;
pub mod validate;

pub use schema::*;
pub use validate::{ValidationError, validate_config};

use std::path::Path;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unsupported config format: {path} (expected .yaml, .yml or .json)")]
    UnsupportedFormat { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a sweep configuration, picking the parser from the file extension.
/// Relative paths inside the document are resolved against its directory.
pub fn load_config(path: &Path) -> ProjectResult<SweepConfig> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => load_yaml(path),
        Some("json") => load_json(path),
        _ => Err(ProjectError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

pub fn load_yaml(path: &Path) -> ProjectResult<SweepConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: SweepConfig = serde_yaml::from_str(&content)?;
    finish_load(config, path)
}

pub fn load_json(path: &Path) -> ProjectResult<SweepConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: SweepConfig = serde_json::from_str(&content)?;
    finish_load(config, path)
}

pub fn save_yaml(path: &Path, config: &SweepConfig) -> ProjectResult<()> {
    validate_config(config)?;
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn finish_load(mut config: SweepConfig, path: &Path) -> ProjectResult<SweepConfig> {
    validate_config(&config)?;
    if let Some(base) = path.parent() {
        config.resolve_relative_to(base);
    }
    Ok(config)
}
