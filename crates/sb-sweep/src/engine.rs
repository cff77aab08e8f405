//! Boundary to the external simulation engine.
//!
//! The engine is opaque: it consumes a model input directory and writes a
//! JSON summary of the run. [`CommandEngine`] drives a real executable as a
//! blocking subprocess; tests substitute their own [`SimulationEngine`].

use sb_project::{BatchPlanDef, ExecutableDef};
use sb_results::FluxSpectrum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// One engine invocation.
#[derive(Debug, Clone, Copy)]
pub struct EngineRequest<'a> {
    pub executable: &'a ExecutableDef,
    pub input_path: &'a Path,
    pub threads: u32,
    pub particles: u64,
    pub batches: BatchPlanDef,
    /// Group boundaries to tally flux over; `None` skips the tally.
    pub energy_divs: Option<&'a [f64]>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Eigenvalue,
    #[serde(alias = "fixed source")]
    FixedSource,
}

/// Wall time spent in each phase, seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PhaseRuntime {
    #[serde(default)]
    pub inactive_batches: f64,
    #[serde(default)]
    pub active_batches: f64,
}

/// What the engine reports about one completed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineReport {
    pub run_mode: RunMode,
    pub n_particles: u64,
    pub n_batches: u32,
    #[serde(default)]
    pub n_inactive: u32,
    pub runtime: PhaseRuntime,
    #[serde(default)]
    pub eigenvalue: Option<f64>,
    #[serde(default)]
    pub flux_spectrum: Option<FluxSpectrum>,
}

impl EngineReport {
    pub fn inactive_particles(&self) -> u64 {
        u64::from(self.n_inactive).saturating_mul(self.n_particles)
    }

    pub fn active_particles(&self) -> u64 {
        self.n_particles
            .saturating_mul(u64::from(self.n_batches.saturating_sub(self.n_inactive)))
    }

    pub fn total_particles(&self) -> u64 {
        self.n_particles.saturating_mul(u64::from(self.n_batches))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("engine produced no summary at {}", path.display())]
    MissingSummary { path: PathBuf },

    #[error("unreadable engine summary {}: {message}", path.display())]
    Summary { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait SimulationEngine {
    /// Run the engine once and block until it finishes.
    fn run(&self, request: &EngineRequest<'_>) -> Result<EngineReport, EngineError>;
}

pub const SUMMARY_FILE: &str = "summary.json";
const STDERR_TAIL: usize = 2000;

/// Runs the configured executable as
/// `<command> <args..> <input> --threads N --particles P --eigenvalue-batches B
/// --eigenvalue-inactive I --fixed-source-batches F --output <dir>
/// [--energy-groups <file>]` inside a scratch directory, then reads
/// `<dir>/summary.json`.
#[derive(Debug, Clone, Default)]
pub struct CommandEngine;

impl CommandEngine {
    pub fn new() -> Self {
        Self
    }

    fn build_command(&self, request: &EngineRequest<'_>, scratch: &Path) -> Result<Command, EngineError> {
        let output_dir = scratch.join("output");
        fs::create_dir_all(&output_dir)?;

        let mut cmd = Command::new(request.executable.command());
        cmd.args(request.executable.args())
            .arg(request.input_path)
            .arg("--threads")
            .arg(request.threads.to_string())
            .arg("--particles")
            .arg(request.particles.to_string())
            .arg("--eigenvalue-batches")
            .arg(request.batches.eigenvalue.to_string())
            .arg("--eigenvalue-inactive")
            .arg(request.batches.eigenvalue_inactive.to_string())
            .arg("--fixed-source-batches")
            .arg(request.batches.fixed_source.to_string())
            .arg("--output")
            .arg(&output_dir);

        if let Some(divs) = request.energy_divs {
            let groups_path = scratch.join("energy_groups.json");
            fs::write(&groups_path, serde_json::to_vec(divs).map_err(std::io::Error::other)?)?;
            cmd.arg("--energy-groups").arg(groups_path);
        }

        cmd.env("OMP_NUM_THREADS", request.threads.to_string())
            .current_dir(scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        Ok(cmd)
    }
}

impl SimulationEngine for CommandEngine {
    fn run(&self, request: &EngineRequest<'_>) -> Result<EngineReport, EngineError> {
        let scratch = tempfile::tempdir()?;
        let mut cmd = self.build_command(request, scratch.path())?;
        let program = request.executable.command().to_string();

        debug!(
            program = %program,
            threads = request.threads,
            particles = request.particles,
            "invoking simulation engine"
        );
        let output = cmd.output().map_err(|source| EngineError::Spawn {
            program: program.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail = stderr.get(start..).unwrap_or(&stderr).trim().to_string();
            return Err(EngineError::ExitStatus {
                program,
                status: output.status.to_string(),
                stderr: tail,
            });
        }

        read_summary(&scratch.path().join("output").join(SUMMARY_FILE))
    }
}

/// Parse an engine summary document.
pub fn read_summary(path: &Path) -> Result<EngineReport, EngineError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(EngineError::MissingSummary {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content).map_err(|e| EngineError::Summary {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
