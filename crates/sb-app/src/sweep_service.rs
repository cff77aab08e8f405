//! Sweep plan execution and sweep cache maintenance.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use sb_project::SweepConfig;
use sb_results::{
    ExecutionResult, RunArtifactStore, RunConfig, RunResults, SweepCache, new_run_date, new_run_id,
};
use sb_sweep::{ScalingSweepRunner, SimulationEngine, SweepProgress, SweepSettings, SweepTarget};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::progress::{PlanProgressEvent, PlanStage};

/// Load and validate a sweep configuration.
pub fn load_sweep_config(path: &Path) -> AppResult<SweepConfig> {
    if !path.exists() {
        return Err(AppError::ConfigFileRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    Ok(sb_project::load_config(path)?)
}

/// Overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Replaces `use_cache` from the config when set.
    pub use_cache: Option<bool>,
    /// Restrict the plan to these models; empty runs all of them.
    pub models: Vec<String>,
    /// Restrict the plan to these executables; empty runs all of them.
    pub executables: Vec<String>,
    /// Clock used for the run id and date. Defaults to now.
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct PlanResponse {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub pairs: usize,
    pub loaded_from_cache: usize,
    pub failed_points: usize,
    pub elapsed_wall_s: f64,
}

fn emit_progress(
    progress_cb: &mut Option<&mut dyn FnMut(PlanProgressEvent)>,
    event: PlanProgressEvent,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(event);
    }
}

/// Run every selected `(model, executable)` pair and write one run artifact.
pub fn execute_plan<E: SimulationEngine + ?Sized>(
    config: &SweepConfig,
    engine: &E,
    options: &PlanOptions,
) -> AppResult<PlanResponse> {
    execute_plan_with_progress(config, engine, options, None)
}

/// Same as [`execute_plan`], streaming progress events.
///
/// Pairs run one after another in sorted order; nothing here runs
/// concurrently with the engine.
pub fn execute_plan_with_progress<E: SimulationEngine + ?Sized>(
    config: &SweepConfig,
    engine: &E,
    options: &PlanOptions,
    mut progress_cb: Option<&mut dyn FnMut(PlanProgressEvent)>,
) -> AppResult<PlanResponse> {
    let started = Instant::now();
    let pairs = plan_pairs(config, options)?;
    let pair_count = pairs.len();
    let use_cache = options.use_cache.unwrap_or(config.use_cache);

    let now = options.now.unwrap_or_else(Utc::now);
    let run_id = new_run_id(now);
    let date = new_run_date(now);
    info!(run_id = %run_id, pairs = pair_count, use_cache, "executing sweep plan");

    let runner = ScalingSweepRunner::new(engine, SweepCache::new(&config.cache_dir));
    let mut results: BTreeMap<String, BTreeMap<String, ExecutionResult>> = BTreeMap::new();
    let mut loaded_from_cache = 0;
    let mut failed_points = 0;

    for (pair_index, (model, executable)) in pairs.iter().enumerate() {
        let (Some(input_path), Some(invocation)) = (
            config.models.get(model),
            config.executables.get(executable),
        ) else {
            continue;
        };
        let target = SweepTarget {
            model,
            input_path,
            executable,
            invocation,
        };
        let mut settings = SweepSettings::for_executable(config, executable);
        settings.use_cache = use_cache;

        let stage_event = |stage: PlanStage, message: Option<String>| {
            PlanProgressEvent::stage(
                stage,
                pair_index,
                pair_count,
                started.elapsed().as_secs_f64(),
                message,
            )
            .for_pair(model, executable)
        };

        if use_cache {
            emit_progress(&mut progress_cb, stage_event(PlanStage::CheckingCache, None));
        }

        let outcome = {
            let mut forward = |sweep: SweepProgress| {
                let mut event = stage_event(PlanStage::Sweeping, None);
                event.sweep = Some(sweep);
                emit_progress(&mut progress_cb, event);
            };
            runner.run_with_progress(&target, &settings, Some(&mut forward))?
        };

        if outcome.loaded_from_cache {
            loaded_from_cache += 1;
            emit_progress(&mut progress_cb, stage_event(PlanStage::LoadedFromCache, None));
        }
        failed_points += outcome.failed_points;

        results
            .entry(model.clone())
            .or_default()
            .insert(executable.clone(), outcome.result);
    }

    emit_progress(
        &mut progress_cb,
        PlanProgressEvent::stage(
            PlanStage::WritingArtifact,
            pair_count,
            pair_count,
            started.elapsed().as_secs_f64(),
            Some(run_id.clone()),
        ),
    );

    let run_config = RunConfig {
        run_id: run_id.clone(),
        date: date.clone(),
        models: pairs.iter().map(|(m, _)| m.clone()).collect(),
        executables: pairs.iter().map(|(_, e)| e.clone()).collect(),
    };
    let run_results = RunResults {
        run_id: run_id.clone(),
        date,
        results,
    };
    let run_dir = RunArtifactStore::new(&config.results_dir).save(&run_config, &run_results)?;

    let elapsed_wall_s = started.elapsed().as_secs_f64();
    emit_progress(
        &mut progress_cb,
        PlanProgressEvent::stage(
            PlanStage::Completed,
            pair_count,
            pair_count,
            elapsed_wall_s,
            None,
        ),
    );
    info!(
        run_id = %run_id,
        run_dir = %run_dir.display(),
        loaded_from_cache,
        failed_points,
        elapsed_wall_s,
        "sweep plan finished"
    );

    Ok(PlanResponse {
        run_id,
        run_dir,
        pairs: pair_count,
        loaded_from_cache,
        failed_points,
        elapsed_wall_s,
    })
}

/// Sorted `(model, executable)` pairs selected by `options`.
fn plan_pairs(config: &SweepConfig, options: &PlanOptions) -> AppResult<Vec<(String, String)>> {
    check_known("model", &options.models, |name| config.models.contains_key(name))?;
    check_known("executable", &options.executables, |name| {
        config.executables.contains_key(name)
    })?;

    let selected = |selection: &[String], name: &str| {
        selection.is_empty() || selection.iter().any(|s| s == name)
    };

    let mut pairs = Vec::new();
    for model in config.models.keys() {
        if !selected(&options.models, model.as_str()) {
            continue;
        }
        for executable in config.executables.keys() {
            if selected(&options.executables, executable.as_str()) {
                pairs.push((model.clone(), executable.clone()));
            }
        }
    }
    Ok(pairs)
}

fn check_known(
    kind: &'static str,
    names: &[String],
    known: impl Fn(&str) -> bool,
) -> AppResult<()> {
    match names.iter().find(|name| !known(name.as_str())) {
        Some(name) => Err(AppError::UnknownName {
            kind,
            name: name.clone(),
        }),
        None => Ok(()),
    }
}

/// `(model, executable)` pairs that currently have a cache entry.
pub fn list_cache(config: &SweepConfig) -> AppResult<Vec<(String, String)>> {
    Ok(SweepCache::new(&config.cache_dir).entries()?)
}

/// Drop cache entries for the configured pairs, optionally narrowed to one
/// model and/or executable. Returns how many entries were removed.
pub fn clear_cache(
    config: &SweepConfig,
    model: Option<&str>,
    executable: Option<&str>,
) -> AppResult<usize> {
    let cache = SweepCache::new(&config.cache_dir);
    let mut removed = 0;
    for m in config.models.keys() {
        if model.is_some_and(|wanted| wanted != m) {
            continue;
        }
        for e in config.executables.keys() {
            if executable.is_some_and(|wanted| wanted != e) {
                continue;
            }
            if cache.remove(m, e)? {
                removed += 1;
            }
        }
    }
    info!(cache_dir = %config.cache_dir.display(), removed, "cleared sweep cache");
    Ok(removed)
}
