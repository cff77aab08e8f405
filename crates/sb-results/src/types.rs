//! Run artifact data types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

pub type RunId = String;

/// Model name -> executable name -> measurements.
pub type ResultsByModel = BTreeMap<String, BTreeMap<String, ExecutionResult>>;

/// `config.json` of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub run_id: RunId,
    pub date: String,
    pub models: BTreeSet<String>,
    pub executables: BTreeSet<String>,
}

/// `results.json` of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResults {
    pub run_id: RunId,
    pub date: String,
    pub results: ResultsByModel,
}

/// One model/executable sweep: rates per thread count plus optional
/// diagnostics from the densest run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExecutionResult {
    pub scaling: Vec<ScalingPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eigenvalue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flux_spectrum: Option<FluxSpectrum>,
}

/// Throughput at one thread count. `None` marks an undefined rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScalingPoint {
    pub threads: u32,
    #[serde(default)]
    pub active_rate: Option<f64>,
    #[serde(default)]
    pub inactive_rate: Option<f64>,
}

impl ScalingPoint {
    pub fn rate(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::ActiveRate => self.active_rate,
            Metric::InactiveRate => self.inactive_rate,
        }
    }
}

/// Flux tallied over energy groups; `energy_divs` holds the group boundaries,
/// so it is one longer than `flux_values`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FluxSpectrum {
    pub energy_divs: Vec<f64>,
    pub flux_values: Vec<f64>,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    ActiveRate,
    InactiveRate,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::ActiveRate => "active_rate",
            Metric::InactiveRate => "inactive_rate",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::ActiveRate => "Active Rate",
            Metric::InactiveRate => "Inactive Rate",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active_rate" | "active" => Ok(Metric::ActiveRate),
            "inactive_rate" | "inactive" => Ok(Metric::InactiveRate),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

/// A validated run: config and results that agree on id and date.
///
/// Only [`crate::RunArtifactStore`] constructs these, so a `Run` in hand has
/// always passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    config: RunConfig,
    results: RunResults,
    display_name: String,
    timestamp: Option<NaiveDateTime>,
    path: PathBuf,
}

impl Run {
    pub(crate) fn new(config: RunConfig, results: RunResults, path: PathBuf) -> Self {
        let display_name = crate::naming::display_name(&config.run_id, &config.date);
        let timestamp = crate::naming::parse_timestamp(&config.date);
        Self {
            config,
            results,
            display_name,
            timestamp,
            path,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.run_id
    }

    pub fn date(&self) -> &str {
        &self.config.date
    }

    /// Parsed form of `date`, when it is an ISO-8601 timestamp.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn results(&self) -> &ResultsByModel {
        &self.results.results
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn execution(&self, model: &str, executable: &str) -> Option<&ExecutionResult> {
        self.results.results.get(model)?.get(executable)
    }

    /// Declared model/executable pairs that have no results entry.
    pub fn coverage_gaps(&self) -> Vec<(String, String)> {
        let mut gaps = Vec::new();
        for model in &self.config.models {
            for executable in &self.config.executables {
                if self.execution(model, executable).is_none() {
                    gaps.push((model.clone(), executable.clone()));
                }
            }
        }
        gaps
    }
}
