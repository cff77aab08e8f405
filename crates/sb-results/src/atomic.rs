//! Whole-file replacement writes.

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::ResultsResult;

/// Serialize `value` as pretty JSON and move it over `path` in one rename, so
/// readers see either the previous document or the new one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> ResultsResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
