#![allow(dead_code)]

use std::fs;
use std::path::Path;

use serde_json::{Value, json};

/// Write a run directory with a matching config/results pair.
pub fn write_run(root: &Path, run_id: &str, date: &str, results: Value) {
    let models: Vec<&String> = results
        .as_object()
        .map(|m| m.keys().collect())
        .unwrap_or_default();
    let mut executables: Vec<String> = results
        .as_object()
        .into_iter()
        .flat_map(|m| m.values())
        .filter_map(Value::as_object)
        .flat_map(|by_exe| by_exe.keys().cloned())
        .collect();
    executables.sort();
    executables.dedup();

    let dir = root.join(run_id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.json"),
        json!({"run_id": run_id, "date": date, "models": models, "executables": executables})
            .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("results.json"),
        json!({"run_id": run_id, "date": date, "results": results}).to_string(),
    )
    .unwrap();
}

/// Scaling series from `(threads, active_rate)` pairs.
pub fn series(points: &[(u32, Option<f64>)]) -> Value {
    let scaling: Vec<Value> = points
        .iter()
        .map(|(threads, active)| json!({"threads": threads, "active_rate": active}))
        .collect();
    json!({ "scaling": scaling })
}
