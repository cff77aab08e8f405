use std::fs;
use std::path::PathBuf;

use sb_project::{ProjectError, load_config};

const CONFIG_YAML: &str = "\
max_threads: 32
thread_step: 8
particles_per_thread: 250
n_repeats: 3
use_cache: true
thread_caps:
  moab: 16
models:
  simple_tokamak: models/simple_tokamak
executables:
  moab: /opt/moab/bin/openmc
  xdg: /opt/xdg/bin/openmc
";

#[test]
fn yaml_config_loads_and_resolves_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scaling.yaml");
    fs::write(&path, CONFIG_YAML).expect("write config");

    let config = load_config(&path).expect("config should load");
    assert_eq!(config.max_threads, 32);
    assert_eq!(config.thread_step, 8);
    assert_eq!(config.n_repeats, 3);
    assert!(config.use_cache);
    assert_eq!(config.max_threads_for("moab"), 16);
    assert_eq!(config.max_threads_for("xdg"), 32);
    assert_eq!(
        config.models["simple_tokamak"],
        dir.path().join("models/simple_tokamak")
    );
    assert_eq!(config.results_dir, dir.path().join("results/runs"));
}

#[test]
fn json_config_loads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scaling.json");
    fs::write(
        &path,
        r#"{"models": {"m": "/abs/m"}, "executables": {"e": {"command": "openmc", "args": ["-q"]}}}"#,
    )
    .expect("write config");

    let config = load_config(&path).expect("config should load");
    assert_eq!(config.models["m"], PathBuf::from("/abs/m"));
    assert_eq!(config.executables["e"].args(), ["-q".to_string()]);
}

#[test]
fn invalid_config_fails_with_named_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scaling.yaml");
    fs::write(
        &path,
        "n_repeats: 0\nmodels:\n  m: m\nexecutables:\n  e: openmc\n",
    )
    .expect("write config");

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ProjectError::Validation(_)));
    assert!(err.to_string().contains("n_repeats"));
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scaling_config.i");
    fs::write(&path, "[models]\n").expect("write config");

    assert!(matches!(
        load_config(&path),
        Err(ProjectError::UnsupportedFormat { .. })
    ));
}

#[test]
fn saved_config_reloads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("in.yaml");
    fs::write(&src, CONFIG_YAML).expect("write config");
    let config = load_config(&src).expect("load");

    let dst = dir.path().join("out.yaml");
    sb_project::save_yaml(&dst, &config).expect("save");
    let reloaded = load_config(&dst).expect("reload");
    assert_eq!(reloaded, config);
}
