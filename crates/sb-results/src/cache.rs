//! Sweep cache: one JSON document per model/executable pair.
//!
//! Identity is exactly the pair. Entries never expire; callers decide whether
//! to trust them and overwrite them by calling [`SweepCache::put`] again.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::atomic::write_json_atomic;
use crate::hash::cache_key;
use crate::types::{ExecutionResult, FluxSpectrum, ScalingPoint};
use crate::{ResultsError, ResultsResult};

/// Serialized layout of a cache entry. Rate arrays run parallel to `threads`;
/// undefined rates are `null`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheDocument {
    pub model: String,
    pub executable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub threads: Vec<u32>,
    pub inactive_rates: Vec<Option<f64>>,
    pub active_rates: Vec<Option<f64>>,
    #[serde(default)]
    pub eigenvalue: Option<f64>,
    #[serde(default)]
    pub flux_values: Vec<f64>,
    #[serde(default)]
    pub energy_divs: Vec<f64>,
}

impl CacheDocument {
    pub fn from_result(
        model: &str,
        executable: &str,
        result: &ExecutionResult,
        fingerprint: Option<&str>,
    ) -> Self {
        let (energy_divs, flux_values) = match &result.flux_spectrum {
            Some(spectrum) => (spectrum.energy_divs.clone(), spectrum.flux_values.clone()),
            None => (Vec::new(), Vec::new()),
        };
        Self {
            model: model.to_string(),
            executable: executable.to_string(),
            fingerprint: fingerprint.map(str::to_string),
            threads: result.scaling.iter().map(|p| p.threads).collect(),
            inactive_rates: result.scaling.iter().map(|p| p.inactive_rate).collect(),
            active_rates: result.scaling.iter().map(|p| p.active_rate).collect(),
            eigenvalue: result.eigenvalue,
            flux_values,
            energy_divs,
        }
    }

    pub fn into_result(self) -> Result<ExecutionResult, String> {
        let n = self.threads.len();
        if self.inactive_rates.len() != n || self.active_rates.len() != n {
            return Err(format!(
                "rate arrays ({} inactive, {} active) do not match {} thread counts",
                self.inactive_rates.len(),
                self.active_rates.len(),
                n
            ));
        }

        let scaling = self
            .threads
            .iter()
            .zip(self.inactive_rates.iter().zip(&self.active_rates))
            .map(|(&threads, (&inactive_rate, &active_rate))| ScalingPoint {
                threads,
                active_rate,
                inactive_rate,
            })
            .collect();

        let flux_spectrum = if self.flux_values.is_empty() && self.energy_divs.is_empty() {
            None
        } else {
            Some(FluxSpectrum {
                energy_divs: self.energy_divs,
                flux_values: self.flux_values,
            })
        };

        Ok(ExecutionResult {
            scaling,
            eigenvalue: self.eigenvalue,
            flux_spectrum,
        })
    }
}

/// A cached sweep plus the fingerprint of the parameters that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub result: ExecutionResult,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SweepCache {
    dir: PathBuf,
}

impl SweepCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, model: &str, executable: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(model, executable)))
    }

    /// Cached sweep for the pair, `None` when there is none.
    pub fn get(&self, model: &str, executable: &str) -> ResultsResult<Option<CacheEntry>> {
        let path = self.entry_path(model, executable);
        let Some(doc) = read_cache_document(&path)? else {
            return Ok(None);
        };

        if doc.model != model || doc.executable != executable {
            warn!(
                path = %path.display(),
                stored_model = %doc.model,
                stored_executable = %doc.executable,
                "cache entry belongs to a different pair; ignoring"
            );
            return Ok(None);
        }

        let fingerprint = doc.fingerprint.clone();
        let result = doc
            .into_result()
            .map_err(|message| ResultsError::CorruptCacheEntry {
                path: path.clone(),
                message,
            })?;
        Ok(Some(CacheEntry {
            result,
            fingerprint,
        }))
    }

    /// Store (or replace) the sweep for the pair.
    pub fn put(
        &self,
        model: &str,
        executable: &str,
        result: &ExecutionResult,
        fingerprint: Option<&str>,
    ) -> ResultsResult<()> {
        let doc = CacheDocument::from_result(model, executable, result, fingerprint);
        write_json_atomic(&self.entry_path(model, executable), &doc)
    }

    /// Drop the entry for the pair. Returns whether one existed.
    pub fn remove(&self, model: &str, executable: &str) -> ResultsResult<bool> {
        match fs::remove_file(self.entry_path(model, executable)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Pairs with a readable entry, sorted.
    pub fn entries(&self) -> ResultsResult<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        if !self.dir.exists() {
            return Ok(pairs);
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_cache_document(&path) {
                Ok(Some(doc)) => pairs.push((doc.model, doc.executable)),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable cache entry"),
            }
        }

        pairs.sort();
        Ok(pairs)
    }
}

fn read_cache_document(path: &Path) -> ResultsResult<Option<CacheDocument>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let doc = serde_json::from_str(&content).map_err(|e| ResultsError::CorruptCacheEntry {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(Some(doc))
}
