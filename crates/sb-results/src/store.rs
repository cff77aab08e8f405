//! On-disk run artifacts: `<root>/<run_id>/{config.json,results.json}`.

use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::atomic::write_json_atomic;
use crate::types::{Run, RunConfig, RunResults};
use crate::validate::{CONFIG_FILE, InvalidReason, InvalidRun, RESULTS_FILE, validate_pair};
use crate::{ResultsError, ResultsResult};

#[derive(Debug, Clone)]
pub struct RunArtifactStore {
    root_dir: PathBuf,
}

impl RunArtifactStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    /// Immediate subdirectories of the root, sorted by name. A missing root is
    /// a hard failure; everything below it is classified per run.
    pub fn list_run_dirs(&self) -> ResultsResult<Vec<PathBuf>> {
        if !self.root_dir.is_dir() {
            return Err(ResultsError::RootMissing {
                path: self.root_dir.clone(),
            });
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Load and validate the run stored in `run_dir`. Pure read.
    pub fn load(&self, run_dir: &Path) -> Result<Run, InvalidRun> {
        let invalid = |reason| InvalidRun::new(run_dir, reason);

        let config: RunConfig =
            read_document(&run_dir.join(CONFIG_FILE), CONFIG_FILE).map_err(invalid)?;
        let results: RunResults =
            read_document(&run_dir.join(RESULTS_FILE), RESULTS_FILE).map_err(invalid)?;
        validate_pair(&config, &results).map_err(invalid)?;

        Ok(Run::new(config, results, run_dir.to_path_buf()))
    }

    pub fn load_run(&self, run_id: &str) -> Result<Run, InvalidRun> {
        self.load(&self.run_dir(run_id))
    }

    /// Write a run pair under `<root>/<run_id>/`. The pair must pass the same
    /// validation `load` applies.
    pub fn save(&self, config: &RunConfig, results: &RunResults) -> ResultsResult<PathBuf> {
        let run_dir = self.run_dir(&config.run_id);
        validate_pair(config, results)
            .map_err(|reason| ResultsError::InvalidArtifact(InvalidRun::new(&run_dir, reason)))?;

        fs::create_dir_all(&run_dir)?;
        write_json_atomic(&run_dir.join(RESULTS_FILE), results)?;
        write_json_atomic(&run_dir.join(CONFIG_FILE), config)?;
        Ok(run_dir)
    }
}

fn read_document<T: DeserializeOwned>(path: &Path, file: &'static str) -> Result<T, InvalidReason> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(InvalidReason::Missing { file }),
        Err(e) => {
            return Err(InvalidReason::Malformed {
                file,
                message: e.to_string(),
            });
        }
    };

    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| InvalidReason::Malformed {
            file,
            message: e.to_string(),
        })?;

    serde_json::from_value(value).map_err(|e| InvalidReason::Schema {
        file,
        message: e.to_string(),
    })
}
