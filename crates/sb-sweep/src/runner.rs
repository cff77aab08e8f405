//! Thread-count scaling sweeps for one model/executable pair.

use sb_project::{BatchPlanDef, ExecutableDef, SweepConfig};
use sb_results::{ExecutionResult, FluxSpectrum, ScalingPoint, SweepCache, validate_execution};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::energy::fine_group_structure;
use crate::engine::{EngineReport, EngineRequest, RunMode, SimulationEngine};
use crate::{SweepError, SweepResult};

/// Knobs for one sweep, already resolved for a specific executable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepSettings {
    pub max_threads: u32,
    pub thread_step: u32,
    pub particles_per_thread: u64,
    pub n_repeats: u32,
    pub use_cache: bool,
    pub collect_diagnostics: bool,
    pub batches: BatchPlanDef,
    pub energy_groups: usize,
}

impl SweepSettings {
    /// Settings for `executable`, with its thread cap applied.
    pub fn for_executable(config: &SweepConfig, executable: &str) -> Self {
        Self {
            max_threads: config.max_threads_for(executable),
            thread_step: config.thread_step,
            particles_per_thread: config.particles_per_thread,
            n_repeats: config.n_repeats,
            use_cache: config.use_cache,
            collect_diagnostics: config.collect_diagnostics,
            batches: config.batches,
            energy_groups: config.energy_groups,
        }
    }

    /// `0, step, 2*step, .. < max_threads`, with 0 coerced to a single
    /// thread and duplicates dropped.
    pub fn thread_counts(&self) -> Vec<u32> {
        let step = self.thread_step.max(1) as usize;
        let mut counts: Vec<u32> = (0..self.max_threads)
            .step_by(step)
            .map(|t| t.max(1))
            .collect();
        counts.dedup();
        counts
    }

    /// Digest of everything that shapes the measurements. The cache key does
    /// not include it; it only flags entries produced under other settings.
    pub fn fingerprint(&self, target: &SweepTarget<'_>) -> String {
        #[derive(Serialize)]
        struct Params<'a> {
            input_path: &'a Path,
            command: &'a str,
            args: &'a [String],
            thread_counts: Vec<u32>,
            particles_per_thread: u64,
            n_repeats: u32,
            batches: BatchPlanDef,
            energy_groups: Option<usize>,
        }

        sb_results::fingerprint(&Params {
            input_path: target.input_path,
            command: target.invocation.command(),
            args: target.invocation.args(),
            thread_counts: self.thread_counts(),
            particles_per_thread: self.particles_per_thread,
            n_repeats: self.n_repeats,
            batches: self.batches,
            energy_groups: self.collect_diagnostics.then_some(self.energy_groups),
        })
    }
}

/// The pair being swept and how to reach it.
#[derive(Debug, Clone, Copy)]
pub struct SweepTarget<'a> {
    pub model: &'a str,
    pub input_path: &'a Path,
    pub executable: &'a str,
    pub invocation: &'a ExecutableDef,
}

/// Emitted before every engine invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepProgress {
    pub point_index: usize,
    pub point_count: usize,
    pub threads: u32,
    pub repetition: u32,
    pub n_repeats: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    pub result: ExecutionResult,
    pub loaded_from_cache: bool,
    pub fingerprint: String,
    pub failed_points: usize,
}

/// Drives the engine across thread counts, strictly one invocation at a time.
pub struct ScalingSweepRunner<'e, E: SimulationEngine + ?Sized> {
    engine: &'e E,
    cache: SweepCache,
}

impl<'e, E: SimulationEngine + ?Sized> ScalingSweepRunner<'e, E> {
    pub fn new(engine: &'e E, cache: SweepCache) -> Self {
        Self { engine, cache }
    }

    pub fn cache(&self) -> &SweepCache {
        &self.cache
    }

    pub fn run(&self, target: &SweepTarget<'_>, settings: &SweepSettings) -> SweepResult<SweepOutcome> {
        self.run_with_progress(target, settings, None)
    }

    pub fn run_with_progress(
        &self,
        target: &SweepTarget<'_>,
        settings: &SweepSettings,
        mut progress_cb: Option<&mut dyn FnMut(SweepProgress)>,
    ) -> SweepResult<SweepOutcome> {
        let fingerprint = settings.fingerprint(target);

        if settings.use_cache
            && let Some(result) = self.lookup_cache(target, &fingerprint)
        {
            return Ok(SweepOutcome {
                result,
                loaded_from_cache: true,
                fingerprint,
                failed_points: 0,
            });
        }

        let thread_counts = settings.thread_counts();
        if thread_counts.is_empty() {
            return Err(SweepError::NoThreadCounts {
                max_threads: settings.max_threads,
            });
        }
        let n_repeats = settings.n_repeats.max(1);
        let energy_divs = settings
            .collect_diagnostics
            .then(|| fine_group_structure(settings.energy_groups));

        info!(
            model = %target.model,
            executable = %target.executable,
            points = thread_counts.len(),
            n_repeats,
            "starting scaling sweep"
        );
        let started = Instant::now();

        let mut scaling = Vec::with_capacity(thread_counts.len());
        let mut diagnostics = Diagnostics::default();
        let mut failed_points = 0;

        for (point_index, &threads) in thread_counts.iter().enumerate() {
            let request = EngineRequest {
                executable: target.invocation,
                input_path: target.input_path,
                threads,
                particles: settings.particles_per_thread * u64::from(threads),
                batches: settings.batches,
                energy_divs: energy_divs.as_deref(),
            };

            let mut totals = PhaseTotals::default();
            let mut last_report = None;
            for repetition in 0..n_repeats {
                if let Some(cb) = progress_cb.as_deref_mut() {
                    cb(SweepProgress {
                        point_index,
                        point_count: thread_counts.len(),
                        threads,
                        repetition,
                        n_repeats,
                    });
                }

                match self.engine.run(&request) {
                    Ok(report) => {
                        totals.add(&report);
                        last_report = Some(report);
                    }
                    Err(e) => {
                        warn!(
                            model = %target.model,
                            executable = %target.executable,
                            threads,
                            repetition,
                            error = %e,
                            "simulation failed; rates at this thread count are undefined"
                        );
                        last_report = None;
                        break;
                    }
                }
            }

            match last_report {
                Some(report) => {
                    scaling.push(totals.point(threads, n_repeats));
                    if settings.collect_diagnostics {
                        diagnostics.offer(report);
                    }
                }
                None => {
                    failed_points += 1;
                    scaling.push(ScalingPoint {
                        threads,
                        active_rate: None,
                        inactive_rate: None,
                    });
                }
            }
        }

        let (eigenvalue, flux_spectrum) = diagnostics.finish(target);
        let result = ExecutionResult {
            scaling,
            eigenvalue,
            flux_spectrum,
        };

        self.cache
            .put(target.model, target.executable, &result, Some(&fingerprint))?;

        info!(
            model = %target.model,
            executable = %target.executable,
            failed_points,
            elapsed_s = started.elapsed().as_secs_f64(),
            "scaling sweep finished"
        );

        Ok(SweepOutcome {
            result,
            loaded_from_cache: false,
            fingerprint,
            failed_points,
        })
    }

    fn lookup_cache(&self, target: &SweepTarget<'_>, fingerprint: &str) -> Option<ExecutionResult> {
        match self.cache.get(target.model, target.executable) {
            Ok(Some(entry)) => {
                if entry.fingerprint.as_deref() != Some(fingerprint) {
                    warn!(
                        model = %target.model,
                        executable = %target.executable,
                        "cached sweep was produced with different settings; using it anyway"
                    );
                }
                info!(model = %target.model, executable = %target.executable, "using cached sweep");
                Some(entry.result)
            }
            Ok(None) => {
                info!(model = %target.model, executable = %target.executable, "no cached sweep");
                None
            }
            Err(e) => {
                warn!(
                    model = %target.model,
                    executable = %target.executable,
                    error = %e,
                    "cached sweep unreadable; recomputing"
                );
                None
            }
        }
    }
}

/// Particle counts and summed phase times over the repetitions of one point.
#[derive(Debug, Default)]
struct PhaseTotals {
    inactive_particles: u64,
    active_particles: u64,
    inactive_time_s: f64,
    active_time_s: f64,
}

impl PhaseTotals {
    fn add(&mut self, report: &EngineReport) {
        self.inactive_particles = report.inactive_particles();
        self.active_particles = report.active_particles();
        self.inactive_time_s += report.runtime.inactive_batches;
        self.active_time_s += report.runtime.active_batches;
    }

    fn point(&self, threads: u32, n_repeats: u32) -> ScalingPoint {
        let n = f64::from(n_repeats);
        ScalingPoint {
            threads,
            active_rate: rate(self.active_particles, self.active_time_s / n),
            inactive_rate: rate(self.inactive_particles, self.inactive_time_s / n),
        }
    }
}

fn rate(particles: u64, mean_time_s: f64) -> Option<f64> {
    (mean_time_s.is_finite() && mean_time_s > 0.0).then(|| particles as f64 / mean_time_s)
}

/// Keeps the diagnostics of the run that simulated the most particles.
#[derive(Debug, Default)]
struct Diagnostics {
    best: Option<EngineReport>,
}

impl Diagnostics {
    fn offer(&mut self, report: EngineReport) {
        let denser = self
            .best
            .as_ref()
            .is_none_or(|best| report.total_particles() >= best.total_particles());
        if denser {
            self.best = Some(report);
        }
    }

    /// Diagnostics that would not pass artifact validation are dropped so
    /// the rates still reach the cache and the run.
    fn finish(self, target: &SweepTarget<'_>) -> (Option<f64>, Option<FluxSpectrum>) {
        let Some(report) = self.best else {
            return (None, None);
        };
        let eigenvalue = match report.run_mode {
            RunMode::Eigenvalue => report.eigenvalue,
            RunMode::FixedSource => None,
        };

        let eigenvalue = eigenvalue.filter(|_| {
            accept_diagnostic(
                target,
                "eigenvalue",
                ExecutionResult {
                    eigenvalue,
                    ..Default::default()
                },
            )
        });
        let flux_spectrum = report.flux_spectrum.filter(|spectrum| {
            accept_diagnostic(
                target,
                "flux_spectrum",
                ExecutionResult {
                    flux_spectrum: Some(spectrum.clone()),
                    ..Default::default()
                },
            )
        });
        (eigenvalue, flux_spectrum)
    }
}

fn accept_diagnostic(target: &SweepTarget<'_>, name: &str, candidate: ExecutionResult) -> bool {
    match validate_execution(&candidate) {
        Ok(()) => true,
        Err(message) => {
            warn!(
                model = %target.model,
                executable = %target.executable,
                diagnostic = name,
                error = %message,
                "discarding malformed engine diagnostic"
            );
            false
        }
    }
}
