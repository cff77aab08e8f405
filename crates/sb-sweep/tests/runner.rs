use std::cell::{Cell, RefCell};
use std::path::Path;

use sb_project::{BatchPlanDef, ExecutableDef, SweepConfig};
use sb_results::{FluxSpectrum, SweepCache, validate_execution};
use sb_sweep::*;

/// Engine stand-in: every run takes 0.25 s inactive (none in fixed-source
/// mode) and 0.5 s active, so the rates scale exactly with the particle count.
struct FakeEngine {
    mode: RunMode,
    fail_at_threads: Option<u32>,
    /// Report one flux value per boundary instead of per group.
    broken_spectrum: bool,
    calls: Cell<usize>,
    seen_threads: RefCell<Vec<u32>>,
}

impl FakeEngine {
    fn new() -> Self {
        Self {
            mode: RunMode::Eigenvalue,
            fail_at_threads: None,
            broken_spectrum: false,
            calls: Cell::new(0),
            seen_threads: RefCell::new(Vec::new()),
        }
    }
}

impl SimulationEngine for FakeEngine {
    fn run(&self, request: &EngineRequest<'_>) -> Result<EngineReport, EngineError> {
        self.calls.set(self.calls.get() + 1);
        self.seen_threads.borrow_mut().push(request.threads);

        if self.fail_at_threads == Some(request.threads) {
            return Err(EngineError::ExitStatus {
                program: "fake".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "segfault".to_string(),
            });
        }

        let (n_batches, n_inactive, inactive_time) = match self.mode {
            RunMode::Eigenvalue => (
                request.batches.eigenvalue,
                request.batches.eigenvalue_inactive,
                0.25,
            ),
            RunMode::FixedSource => (request.batches.fixed_source, 0, 0.0),
        };
        let n_values = if self.broken_spectrum {
            divs_len(request)
        } else {
            divs_len(request).saturating_sub(1)
        };
        let flux_spectrum = request.energy_divs.map(|divs| FluxSpectrum {
            energy_divs: divs.to_vec(),
            flux_values: vec![f64::from(request.threads); n_values],
        });

        Ok(EngineReport {
            run_mode: self.mode,
            n_particles: request.particles,
            n_batches,
            n_inactive,
            runtime: PhaseRuntime {
                inactive_batches: inactive_time,
                active_batches: 0.5,
            },
            eigenvalue: Some(1.0 + f64::from(request.threads) / 1000.0),
            flux_spectrum,
        })
    }
}

fn divs_len(request: &EngineRequest<'_>) -> usize {
    request.energy_divs.map_or(0, <[f64]>::len)
}

fn settings() -> SweepSettings {
    SweepSettings {
        max_threads: 11,
        thread_step: 5,
        particles_per_thread: 100,
        n_repeats: 1,
        use_cache: false,
        collect_diagnostics: true,
        batches: BatchPlanDef::default(),
        energy_groups: 4,
    }
}

fn target(exe: &ExecutableDef) -> SweepTarget<'_> {
    SweepTarget {
        model: "simple_tokamak",
        input_path: Path::new("models/simple_tokamak"),
        executable: "moab",
        invocation: exe,
    }
}

#[test]
fn rates_follow_particles_over_phase_time() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let exe = ExecutableDef::Program("openmc".to_string());
    let runner = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()));

    let outcome = runner.run(&target(&exe), &settings()).unwrap();
    assert!(!outcome.loaded_from_cache);
    assert_eq!(outcome.failed_points, 0);

    let threads: Vec<u32> = outcome.result.scaling.iter().map(|p| p.threads).collect();
    assert_eq!(threads, vec![1, 5, 10]);

    // 100 particles/thread, 5 inactive and 5 active batches.
    for point in &outcome.result.scaling {
        let t = f64::from(point.threads);
        assert_eq!(point.inactive_rate, Some(100.0 * t * 5.0 / 0.25));
        assert_eq!(point.active_rate, Some(100.0 * t * 5.0 / 0.5));
    }
}

#[test]
fn malformed_spectrum_is_dropped_and_rates_are_kept() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine {
        broken_spectrum: true,
        ..FakeEngine::new()
    };
    let exe = ExecutableDef::Program("openmc".to_string());
    let runner = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()));

    let outcome = runner.run(&target(&exe), &settings()).unwrap();
    assert_eq!(outcome.failed_points, 0);
    assert!(outcome.result.flux_spectrum.is_none());
    assert_eq!(outcome.result.eigenvalue, Some(1.01));
    assert!(outcome.result.scaling.iter().all(|p| p.active_rate.is_some()));
    assert!(validate_execution(&outcome.result).is_ok());

    let cached = runner
        .cache()
        .get("simple_tokamak", "moab")
        .unwrap()
        .unwrap();
    assert!(cached.result.flux_spectrum.is_none());
}

#[test]
fn failed_point_has_undefined_rates_and_sweep_continues() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine {
        fail_at_threads: Some(5),
        ..FakeEngine::new()
    };
    let exe = ExecutableDef::Program("openmc".to_string());
    let runner = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()));

    let outcome = runner.run(&target(&exe), &settings()).unwrap();
    assert_eq!(outcome.failed_points, 1);

    let scaling = &outcome.result.scaling;
    assert_eq!(scaling[1].threads, 5);
    assert_eq!(scaling[1].active_rate, None);
    assert_eq!(scaling[1].inactive_rate, None);
    assert!(scaling[2].active_rate.is_some());
}

#[test]
fn failure_in_any_repetition_discards_the_point() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine {
        fail_at_threads: Some(1),
        ..FakeEngine::new()
    };
    let exe = ExecutableDef::Program("openmc".to_string());
    let runner = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()));
    let settings = SweepSettings {
        n_repeats: 3,
        ..settings()
    };

    let outcome = runner.run(&target(&exe), &settings).unwrap();
    assert_eq!(outcome.result.scaling[0].active_rate, None);
    // Point 1 gives up after its first failure; the other two run 3 times each.
    assert_eq!(engine.calls.get(), 1 + 3 + 3);
}

#[test]
fn repeats_keep_rates_and_report_progress() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let exe = ExecutableDef::Program("openmc".to_string());
    let runner = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()));
    let settings = SweepSettings {
        n_repeats: 2,
        ..settings()
    };

    let mut events = Vec::new();
    let mut cb = |p: SweepProgress| events.push(p);
    let outcome = runner
        .run_with_progress(&target(&exe), &settings, Some(&mut cb))
        .unwrap();

    assert_eq!(engine.calls.get(), 6);
    assert_eq!(events.len(), 6);
    assert_eq!(events[0].point_count, 3);
    assert_eq!((events[5].threads, events[5].repetition), (10, 1));
    assert_eq!(outcome.result.scaling[0].active_rate, Some(1000.0));
}

#[test]
fn diagnostics_come_from_the_densest_run() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let exe = ExecutableDef::Program("openmc".to_string());
    let runner = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()));

    let result = runner.run(&target(&exe), &settings()).unwrap().result;

    assert_eq!(result.eigenvalue, Some(1.01));
    let spectrum = result.flux_spectrum.unwrap();
    assert_eq!(spectrum.energy_divs.len(), 5);
    assert_eq!(spectrum.flux_values, vec![10.0; 4]);
}

#[test]
fn fixed_source_runs_have_no_eigenvalue() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine {
        mode: RunMode::FixedSource,
        ..FakeEngine::new()
    };
    let exe = ExecutableDef::Program("openmc".to_string());
    let runner = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()));

    let result = runner.run(&target(&exe), &settings()).unwrap().result;
    assert_eq!(result.eigenvalue, None);
    assert!(result.flux_spectrum.is_some());
    assert!(result.scaling.iter().all(|p| p.inactive_rate.is_none()));
    assert_eq!(result.scaling[0].active_rate, Some(1000.0));
}

#[test]
fn diagnostics_can_be_switched_off() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let exe = ExecutableDef::Program("openmc".to_string());
    let runner = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()));
    let settings = SweepSettings {
        collect_diagnostics: false,
        ..settings()
    };

    let result = runner.run(&target(&exe), &settings).unwrap().result;
    assert_eq!(result.eigenvalue, None);
    assert_eq!(result.flux_spectrum, None);
}

#[test]
fn cache_hit_skips_the_engine() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = ExecutableDef::Program("openmc".to_string());

    let first = FakeEngine::new();
    let computed = ScalingSweepRunner::new(&first, SweepCache::new(tmp.path()))
        .run(&target(&exe), &settings())
        .unwrap();

    let second = FakeEngine::new();
    let settings = SweepSettings {
        use_cache: true,
        ..settings()
    };
    let cached = ScalingSweepRunner::new(&second, SweepCache::new(tmp.path()))
        .run(&target(&exe), &settings)
        .unwrap();

    assert!(cached.loaded_from_cache);
    assert_eq!(second.calls.get(), 0);
    assert_eq!(cached.result, computed.result);
}

#[test]
fn stale_cache_entry_is_still_used() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = ExecutableDef::Program("openmc".to_string());

    ScalingSweepRunner::new(&FakeEngine::new(), SweepCache::new(tmp.path()))
        .run(&target(&exe), &settings())
        .unwrap();

    let engine = FakeEngine::new();
    let settings = SweepSettings {
        use_cache: true,
        particles_per_thread: 5000,
        ..settings()
    };
    let outcome = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()))
        .run(&target(&exe), &settings)
        .unwrap();

    assert!(outcome.loaded_from_cache);
    assert_eq!(engine.calls.get(), 0);
}

#[test]
fn disabled_cache_recomputes_and_overwrites() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = ExecutableDef::Program("openmc".to_string());
    let cache = SweepCache::new(tmp.path());

    ScalingSweepRunner::new(&FakeEngine::new(), cache.clone())
        .run(&target(&exe), &settings())
        .unwrap();

    let engine = FakeEngine {
        fail_at_threads: Some(10),
        ..FakeEngine::new()
    };
    let outcome = ScalingSweepRunner::new(&engine, cache.clone())
        .run(&target(&exe), &settings())
        .unwrap();
    assert!(!outcome.loaded_from_cache);
    assert_eq!(engine.calls.get(), 3);

    let stored = cache.get("simple_tokamak", "moab").unwrap().unwrap();
    assert_eq!(stored.result, outcome.result);
    assert_eq!(stored.fingerprint.as_deref(), Some(outcome.fingerprint.as_str()));
    assert_eq!(stored.result.scaling[2].active_rate, None);
}

#[test]
fn thread_cap_limits_the_sweep() {
    let yaml = "\
max_threads: 20
thread_step: 5
thread_caps:
  xdg: 8
models:
  m: models/m
executables:
  moab: openmc
  xdg: openmc-xdg
";
    let config: SweepConfig = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(
        SweepSettings::for_executable(&config, "moab").thread_counts(),
        vec![1, 5, 10, 15]
    );
    assert_eq!(
        SweepSettings::for_executable(&config, "xdg").thread_counts(),
        vec![1, 5]
    );
}

#[test]
fn engine_sees_thread_counts_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let exe = ExecutableDef::Program("openmc".to_string());
    let settings = SweepSettings {
        max_threads: 3,
        thread_step: 1,
        ..settings()
    };

    ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()))
        .run(&target(&exe), &settings)
        .unwrap();
    assert_eq!(*engine.seen_threads.borrow(), vec![1, 2]);
}

#[test]
fn empty_thread_range_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let exe = ExecutableDef::Program("openmc".to_string());
    let settings = SweepSettings {
        max_threads: 0,
        ..settings()
    };

    let err = ScalingSweepRunner::new(&engine, SweepCache::new(tmp.path()))
        .run(&target(&exe), &settings)
        .unwrap_err();
    assert!(matches!(err, SweepError::NoThreadCounts { max_threads: 0 }));
}
