//! Sweep configuration schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_THREADS: u32 = 90;
pub const DEFAULT_THREAD_STEP: u32 = 5;
pub const DEFAULT_PARTICLES_PER_THREAD: u64 = 100;
pub const DEFAULT_N_REPEATS: u32 = 1;
pub const DEFAULT_ENERGY_GROUPS: usize = 500;

/// Everything a scaling sweep plan needs: engine knobs, the models to run and
/// the executables to compare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default = "default_max_threads")]
    pub max_threads: u32,
    #[serde(default = "default_thread_step")]
    pub thread_step: u32,
    #[serde(default = "default_particles_per_thread")]
    pub particles_per_thread: u64,
    #[serde(default = "default_n_repeats")]
    pub n_repeats: u32,
    #[serde(default)]
    pub use_cache: bool,
    #[serde(default = "default_true")]
    pub collect_diagnostics: bool,
    /// Per-executable upper bound on the thread count.
    #[serde(default)]
    pub thread_caps: BTreeMap<String, u32>,
    /// Model name -> directory holding the model input.
    pub models: BTreeMap<String, PathBuf>,
    /// Executable name -> how to invoke it.
    pub executables: BTreeMap<String, ExecutableDef>,
    #[serde(default)]
    pub batches: BatchPlanDef,
    #[serde(default = "default_energy_groups")]
    pub energy_groups: usize,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

/// Invocation target for one executable: either a bare program path or a
/// program plus fixed leading arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ExecutableDef {
    Program(String),
    Invocation(InvocationDef),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InvocationDef {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ExecutableDef {
    pub fn command(&self) -> &str {
        match self {
            ExecutableDef::Program(program) => program,
            ExecutableDef::Invocation(inv) => &inv.command,
        }
    }

    pub fn args(&self) -> &[String] {
        match self {
            ExecutableDef::Program(_) => &[],
            ExecutableDef::Invocation(inv) => &inv.args,
        }
    }
}

/// Batch counts handed to the engine, by simulation mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub struct BatchPlanDef {
    #[serde(default = "default_eigenvalue_batches")]
    pub eigenvalue: u32,
    #[serde(default = "default_eigenvalue_inactive")]
    pub eigenvalue_inactive: u32,
    #[serde(default = "default_fixed_source_batches")]
    pub fixed_source: u32,
}

impl Default for BatchPlanDef {
    fn default() -> Self {
        Self {
            eigenvalue: default_eigenvalue_batches(),
            eigenvalue_inactive: default_eigenvalue_inactive(),
            fixed_source: default_fixed_source_batches(),
        }
    }
}

impl SweepConfig {
    /// Effective thread ceiling for an executable: the global maximum, lowered
    /// by a per-executable cap when one is configured.
    pub fn max_threads_for(&self, executable: &str) -> u32 {
        match self.thread_caps.get(executable) {
            Some(cap) => (*cap).min(self.max_threads),
            None => self.max_threads,
        }
    }

    /// Rebase relative model, cache and results paths onto `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        for path in self.models.values_mut() {
            rebase(path, base);
        }
        rebase(&mut self.cache_dir, base);
        rebase(&mut self.results_dir, base);
    }
}

fn rebase(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn default_max_threads() -> u32 {
    DEFAULT_MAX_THREADS
}

fn default_thread_step() -> u32 {
    DEFAULT_THREAD_STEP
}

fn default_particles_per_thread() -> u64 {
    DEFAULT_PARTICLES_PER_THREAD
}

fn default_n_repeats() -> u32 {
    DEFAULT_N_REPEATS
}

fn default_true() -> bool {
    true
}

fn default_energy_groups() -> usize {
    DEFAULT_ENERGY_GROUPS
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results/runs")
}

fn default_eigenvalue_batches() -> u32 {
    10
}

fn default_eigenvalue_inactive() -> u32 {
    5
}

fn default_fixed_source_batches() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
models:
  simple_tokamak: models/simple_tokamak
executables:
  moab: /opt/moab/bin/openmc
  xdg:
    command: /opt/xdg/bin/openmc
    args: [--no-banner]
";

    #[test]
    fn defaults_fill_missing_knobs() {
        let config: SweepConfig = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.max_threads, 90);
        assert_eq!(config.thread_step, 5);
        assert_eq!(config.particles_per_thread, 100);
        assert_eq!(config.n_repeats, 1);
        assert!(!config.use_cache);
        assert!(config.collect_diagnostics);
        assert_eq!(config.batches, BatchPlanDef::default());
        assert_eq!(config.cache_dir, PathBuf::from(".cache"));
    }

    #[test]
    fn executable_forms_parse() {
        let config: SweepConfig = serde_yaml::from_str(MINIMAL).unwrap();
        let moab = &config.executables["moab"];
        assert_eq!(moab.command(), "/opt/moab/bin/openmc");
        assert!(moab.args().is_empty());

        let xdg = &config.executables["xdg"];
        assert_eq!(xdg.command(), "/opt/xdg/bin/openmc");
        assert_eq!(xdg.args(), ["--no-banner".to_string()]);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let yaml = format!("{MINIMAL}max_thread: 12\n");
        let err = serde_yaml::from_str::<SweepConfig>(&yaml).unwrap_err();
        assert!(err.to_string().contains("max_thread"));
    }

    #[test]
    fn thread_cap_only_lowers_ceiling() {
        let mut config: SweepConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.max_threads = 40;
        config.thread_caps.insert("moab".to_string(), 16);
        config.thread_caps.insert("xdg".to_string(), 128);

        assert_eq!(config.max_threads_for("moab"), 16);
        assert_eq!(config.max_threads_for("xdg"), 40);
        assert_eq!(config.max_threads_for("other"), 40);
    }

    #[test]
    fn relative_paths_are_rebased() {
        let mut config: SweepConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.resolve_relative_to(Path::new("/bench"));
        assert_eq!(
            config.models["simple_tokamak"],
            PathBuf::from("/bench/models/simple_tokamak")
        );
        assert_eq!(config.cache_dir, PathBuf::from("/bench/.cache"));
        assert_eq!(config.results_dir, PathBuf::from("/bench/results/runs"));
    }
}
