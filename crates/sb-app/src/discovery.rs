//! Run discovery and the immutable run catalog.
//!
//! A [`Catalog`] is built in one pass over a run-artifact root and never
//! changes afterwards. [`RunDiscovery::refresh`] swaps in a freshly scanned
//! catalog; readers holding an older [`RunDiscovery::snapshot`] keep a
//! consistent view.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sb_results::{InvalidReason, InvalidRun, Run, RunArtifactStore};
use tracing::{info, warn};

use crate::error::AppResult;

/// Valid runs under one root, most recent first, plus the rejected ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    root: PathBuf,
    runs: Vec<Run>,
    invalid: Vec<InvalidRun>,
}

impl Catalog {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Run directories that were skipped, with the reason.
    pub fn invalid(&self) -> &[InvalidRun] {
        &self.invalid
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&Run> {
        self.runs.iter().find(|run| run.id() == run_id)
    }

    pub fn display_name(&self, run_id: &str) -> Option<&str> {
        self.get(run_id).map(Run::display_name)
    }

    /// Sorted union of the models declared by every valid run.
    pub fn models(&self) -> Vec<String> {
        self.union(|run| run.config().models.iter())
    }

    /// Sorted union of the executables declared by every valid run.
    pub fn executables(&self) -> Vec<String> {
        self.union(|run| run.config().executables.iter())
    }

    fn union<'a, I>(&'a self, names: impl Fn(&'a Run) -> I) -> Vec<String>
    where
        I: Iterator<Item = &'a String>,
    {
        self.runs
            .iter()
            .flat_map(names)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Scan `root` and build a catalog. Only a missing or unreadable root is an
/// error; individual bad runs are recorded in [`Catalog::invalid`].
pub fn scan(root: &Path) -> AppResult<Catalog> {
    let store = RunArtifactStore::new(root);
    let mut runs = Vec::new();
    let mut invalid = Vec::new();

    for dir in store.list_run_dirs()? {
        match store.load(&dir) {
            Ok(run) => {
                for (model, executable) in run.coverage_gaps() {
                    warn!(
                        run_id = %run.id(),
                        model = %model,
                        executable = %executable,
                        "declared pair has no results"
                    );
                }
                runs.push(run);
            }
            Err(e) => {
                warn!(path = %e.path.display(), reason = %e.reason, "skipping invalid run");
                invalid.push(e);
            }
        }
    }

    runs.sort_by(newest_first);
    let runs = drop_repeated_ids(runs, &mut invalid);
    info!(
        root = %root.display(),
        runs = runs.len(),
        invalid = invalid.len(),
        "scanned run artifacts"
    );

    Ok(Catalog {
        root: root.to_path_buf(),
        runs,
        invalid,
    })
}

/// Parsed dates descending, unparseable dates last, then run id descending.
fn newest_first(a: &Run, b: &Run) -> Ordering {
    let by_date = match (a.timestamp(), b.timestamp()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_date
        .then_with(|| b.id().cmp(a.id()))
        .then_with(|| a.path().cmp(b.path()))
}

/// Keep the first run for each id in catalog order; later copies are
/// recorded as invalid.
fn drop_repeated_ids(runs: Vec<Run>, invalid: &mut Vec<InvalidRun>) -> Vec<Run> {
    let mut kept_at: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut unique = Vec::with_capacity(runs.len());
    for run in runs {
        if let Some(kept) = kept_at.get(run.id()) {
            let reason = InvalidReason::DuplicateId {
                run_id: run.id().to_string(),
                kept: kept.clone(),
            };
            warn!(path = %run.path().display(), reason = %reason, "skipping invalid run");
            invalid.push(InvalidRun::new(run.path(), reason));
            continue;
        }
        kept_at.insert(run.id().to_string(), run.path().to_path_buf());
        unique.push(run);
    }
    unique
}

/// Owner of the current catalog for one run-artifact root.
#[derive(Debug)]
pub struct RunDiscovery {
    root: PathBuf,
    catalog: Arc<Catalog>,
}

impl RunDiscovery {
    /// Scan `root` once and keep the result.
    pub fn open(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        let catalog = Arc::new(scan(&root)?);
        Ok(Self { root, catalog })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Shared handle to the current catalog.
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    /// Rescan the root and replace the catalog wholesale. On error the
    /// previous catalog stays in place.
    pub fn refresh(&mut self) -> AppResult<Arc<Catalog>> {
        self.catalog = Arc::new(scan(&self.root)?);
        Ok(self.snapshot())
    }
}
