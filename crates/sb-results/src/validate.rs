//! Schema and cross-document checks for run artifacts.

use crate::types::{ExecutionResult, RunConfig, RunResults};
use std::path::{Path, PathBuf};

/// Why a run directory was excluded from the catalog.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvalidReason {
    #[error("{file} is missing")]
    Missing { file: &'static str },

    #[error("{file} is not a valid JSON document: {message}")]
    Malformed { file: &'static str, message: String },

    #[error("{file} does not match the run schema: {message}")]
    Schema { file: &'static str, message: String },

    #[error("{field} differs between config ({config}) and results ({results})")]
    Mismatch {
        field: &'static str,
        config: String,
        results: String,
    },

    #[error("run_id {run_id} is already used by {}", kept.display())]
    DuplicateId { run_id: String, kept: PathBuf },
}

/// A run directory that failed to load. Never fatal for a discovery pass.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("invalid run at {}: {reason}", path.display())]
pub struct InvalidRun {
    pub path: PathBuf,
    pub reason: InvalidReason,
}

impl InvalidRun {
    pub fn new(path: &Path, reason: InvalidReason) -> Self {
        Self {
            path: path.to_path_buf(),
            reason,
        }
    }
}

pub const CONFIG_FILE: &str = "config.json";
pub const RESULTS_FILE: &str = "results.json";

/// Check a parsed config/results pair.
pub fn validate_pair(config: &RunConfig, results: &RunResults) -> Result<(), InvalidReason> {
    if config.run_id.trim().is_empty() {
        return Err(InvalidReason::Schema {
            file: CONFIG_FILE,
            message: "run_id is empty".to_string(),
        });
    }

    if config.run_id != results.run_id {
        return Err(InvalidReason::Mismatch {
            field: "run_id",
            config: config.run_id.clone(),
            results: results.run_id.clone(),
        });
    }
    if config.date != results.date {
        return Err(InvalidReason::Mismatch {
            field: "date",
            config: config.date.clone(),
            results: results.date.clone(),
        });
    }

    for (model, by_exe) in &results.results {
        for (executable, execution) in by_exe {
            validate_execution(execution).map_err(|message| InvalidReason::Schema {
                file: RESULTS_FILE,
                message: format!("{model}/{executable}: {message}"),
            })?;
        }
    }

    Ok(())
}

/// Check the invariants of one sweep series.
pub fn validate_execution(execution: &ExecutionResult) -> Result<(), String> {
    let mut previous: Option<u32> = None;
    for point in &execution.scaling {
        if point.threads == 0 {
            return Err("thread count must be positive".to_string());
        }
        if let Some(prev) = previous
            && point.threads <= prev
        {
            return Err(format!(
                "thread counts must increase (got {} after {})",
                point.threads, prev
            ));
        }
        previous = Some(point.threads);

        for (name, rate) in [
            ("active_rate", point.active_rate),
            ("inactive_rate", point.inactive_rate),
        ] {
            if let Some(value) = rate
                && (!value.is_finite() || value < 0.0)
            {
                return Err(format!(
                    "{name} at {} threads must be finite and non-negative, got {value}",
                    point.threads
                ));
            }
        }
    }

    if let Some(k) = execution.eigenvalue
        && !k.is_finite()
    {
        return Err(format!("eigenvalue must be finite, got {k}"));
    }

    if let Some(spectrum) = &execution.flux_spectrum
        && !spectrum.flux_values.is_empty()
        && spectrum.energy_divs.len() != spectrum.flux_values.len() + 1
    {
        return Err(format!(
            "flux spectrum has {} energy boundaries for {} values",
            spectrum.energy_divs.len(),
            spectrum.flux_values.len()
        ));
    }

    Ok(())
}
