//! Filtering and derived metrics over a run catalog.
//!
//! Every query flattens the selected runs into [`TidyRow`]s, drops rows whose
//! metric is undefined, and derives speedup, efficiency, per-pair maxima and
//! summary statistics from what is left.

use std::collections::BTreeMap;

use sb_results::{Metric, Run};
use serde::{Deserialize, Serialize};

use crate::discovery::Catalog;

/// Which slice of the catalog to look at. An empty list places no
/// restriction on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryFilter {
    pub models: Vec<String>,
    pub executables: Vec<String>,
    pub runs: Vec<String>,
    pub metric: Metric,
}

impl QueryFilter {
    pub fn with_metric(metric: Metric) -> Self {
        Self {
            metric,
            ..Self::default()
        }
    }

    fn keeps_run(&self, run: &Run) -> bool {
        allows(&self.runs, run.id())
    }

    fn keeps_pair(&self, model: &str, executable: &str) -> bool {
        allows(&self.models, model) && allows(&self.executables, executable)
    }
}

fn allows(selection: &[String], name: &str) -> bool {
    selection.is_empty() || selection.iter().any(|s| s == name)
}

/// One scaling point of one run, flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidyRow {
    pub run_id: String,
    pub run_date: String,
    pub run_name: String,
    pub model: String,
    pub executable: String,
    pub threads: u32,
    pub active_rate: Option<f64>,
    pub inactive_rate: Option<f64>,
}

impl TidyRow {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::ActiveRate => self.active_rate,
            Metric::InactiveRate => self.inactive_rate,
        }
    }
}

/// Speedup and efficiency of one run's series for one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedupSeries {
    pub model: String,
    pub executable: String,
    pub run_id: String,
    pub run_name: String,
    pub threads: Vec<u32>,
    pub speedup: Vec<f64>,
    pub efficiency: Vec<f64>,
}

/// Reference line from (1, 1) to (max_threads, max_threads).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IdealSpeedup {
    pub max_threads: u32,
}

impl IdealSpeedup {
    pub fn points(&self) -> [(f64, f64); 2] {
        let max = f64::from(self.max_threads);
        [(1.0, 1.0), (max, max)]
    }
}

/// Highest observed value of the metric for one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonEntry {
    pub model: String,
    pub executable: String,
    pub max_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestRow {
    pub run_id: String,
    pub model: String,
    pub executable: String,
    pub threads: u32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySummary {
    pub metric: Metric,
    pub row_count: usize,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub best: BestRow,
    /// Distinct values in first-occurrence order.
    pub models: Vec<String>,
    pub executables: Vec<String>,
    pub runs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    pub rows: Vec<TidyRow>,
    pub speedup_series: Vec<SpeedupSeries>,
    pub ideal_speedup: IdealSpeedup,
    pub comparison: Vec<ComparisonEntry>,
    pub summary: QuerySummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDataReason {
    NoRuns,
    NoMatchingRows,
    MetricUndefined,
}

impl NoDataReason {
    pub fn message(&self) -> &'static str {
        match self {
            NoDataReason::NoRuns => "No benchmark runs found",
            NoDataReason::NoMatchingRows => "No data matches the current selection",
            NoDataReason::MetricUndefined => "The selected metric has no values for this selection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    NoData { reason: NoDataReason },
    Data(QueryReport),
}

impl QueryOutcome {
    pub fn report(&self) -> Option<&QueryReport> {
        match self {
            QueryOutcome::Data(report) => Some(report),
            QueryOutcome::NoData { .. } => None,
        }
    }
}

/// All rows selected by `filter`, ignoring the metric. Ordered by
/// `(model, executable)`, then catalog run order, then thread count.
pub fn select_rows(catalog: &Catalog, filter: &QueryFilter) -> Vec<TidyRow> {
    let mut keyed = Vec::new();

    for (run_index, run) in catalog.runs().iter().enumerate() {
        if !filter.keeps_run(run) {
            continue;
        }
        for (model, by_exe) in run.results() {
            for (executable, execution) in by_exe {
                if !filter.keeps_pair(model, executable) {
                    continue;
                }
                for point in &execution.scaling {
                    let row = TidyRow {
                        run_id: run.id().to_string(),
                        run_date: run.date().to_string(),
                        run_name: run.display_name().to_string(),
                        model: model.clone(),
                        executable: executable.clone(),
                        threads: point.threads,
                        active_rate: point.active_rate,
                        inactive_rate: point.inactive_rate,
                    };
                    keyed.push((run_index, row));
                }
            }
        }
    }

    keyed.sort_by(|(ia, a), (ib, b)| {
        (&a.model, &a.executable, ia, a.threads).cmp(&(&b.model, &b.executable, ib, b.threads))
    });
    keyed.into_iter().map(|(_, row)| row).collect()
}

/// Run a query against `catalog`.
pub fn query(catalog: &Catalog, filter: &QueryFilter) -> QueryOutcome {
    if catalog.is_empty() {
        return QueryOutcome::NoData {
            reason: NoDataReason::NoRuns,
        };
    }

    let selected = select_rows(catalog, filter);
    if selected.is_empty() {
        return QueryOutcome::NoData {
            reason: NoDataReason::NoMatchingRows,
        };
    }

    let metric = filter.metric;
    let rows: Vec<TidyRow> = selected
        .into_iter()
        .filter(|row| row.value(metric).is_some())
        .collect();

    let Some(summary) = summarize(&rows, metric) else {
        return QueryOutcome::NoData {
            reason: NoDataReason::MetricUndefined,
        };
    };

    let max_threads = rows.iter().map(|row| row.threads).max().unwrap_or(1);

    QueryOutcome::Data(QueryReport {
        speedup_series: speedup_series(&rows, metric),
        ideal_speedup: IdealSpeedup { max_threads },
        comparison: comparison(&rows, metric),
        summary,
        rows,
    })
}

/// Speedup `rate(t) / rate(1)` and efficiency `speedup / t` for every run of
/// every pair that has a positive single-thread baseline.
pub fn speedup_series(rows: &[TidyRow], metric: Metric) -> Vec<SpeedupSeries> {
    let mut series = Vec::new();

    for chunk in rows.chunk_by(|a, b| {
        a.model == b.model && a.executable == b.executable && a.run_id == b.run_id
    }) {
        let Some(first) = chunk.first() else {
            continue;
        };
        let baseline = chunk
            .iter()
            .find(|row| row.threads == 1)
            .and_then(|row| row.value(metric))
            .filter(|base| *base > 0.0);
        let Some(baseline) = baseline else {
            continue;
        };

        let mut threads = Vec::with_capacity(chunk.len());
        let mut speedup = Vec::with_capacity(chunk.len());
        let mut efficiency = Vec::with_capacity(chunk.len());
        for row in chunk {
            if let Some(value) = row.value(metric) {
                let s = value / baseline;
                threads.push(row.threads);
                speedup.push(s);
                efficiency.push(s / f64::from(row.threads));
            }
        }

        series.push(SpeedupSeries {
            model: first.model.clone(),
            executable: first.executable.clone(),
            run_id: first.run_id.clone(),
            run_name: first.run_name.clone(),
            threads,
            speedup,
            efficiency,
        });
    }

    series
}

/// Maximum metric value per `(model, executable)`, in sorted pair order.
pub fn comparison(rows: &[TidyRow], metric: Metric) -> Vec<ComparisonEntry> {
    let mut maxima: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    for row in rows {
        if let Some(value) = row.value(metric) {
            maxima
                .entry((row.model.as_str(), row.executable.as_str()))
                .and_modify(|max| *max = max.max(value))
                .or_insert(value);
        }
    }

    maxima
        .into_iter()
        .map(|((model, executable), max_value)| ComparisonEntry {
            model: model.to_string(),
            executable: executable.to_string(),
            max_value,
        })
        .collect()
}

/// Summary statistics over rows with a defined metric; `None` when there
/// are none.
pub fn summarize(rows: &[TidyRow], metric: Metric) -> Option<QuerySummary> {
    let mut best: Option<(&TidyRow, f64)> = None;
    let mut min = f64::INFINITY;
    let mut sum = 0.0;
    let mut count = 0usize;

    for row in rows {
        let Some(value) = row.value(metric) else {
            continue;
        };
        if best.is_none_or(|(_, max)| value > max) {
            best = Some((row, value));
        }
        min = min.min(value);
        sum += value;
        count += 1;
    }

    let (best_row, max) = best?;
    Some(QuerySummary {
        metric,
        row_count: count,
        max,
        min,
        mean: sum / count as f64,
        best: BestRow {
            run_id: best_row.run_id.clone(),
            model: best_row.model.clone(),
            executable: best_row.executable.clone(),
            threads: best_row.threads,
            value: max,
        },
        models: distinct(rows.iter().map(|row| row.model.as_str())),
        executables: distinct(rows.iter().map(|row| row.executable.as_str())),
        runs: distinct(rows.iter().map(|row| row.run_name.as_str())),
    })
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.iter().any(|seen| seen == value) {
            out.push(value.to_string());
        }
    }
    out
}

/// Render rows as CSV with a header line. Undefined rates are empty cells.
pub fn rows_to_csv(rows: &[TidyRow]) -> String {
    let mut csv = String::from(
        "run_id,run_date,run_name,model,executable,threads,active_rate,inactive_rate\n",
    );
    for row in rows {
        let fields = [
            csv_field(&row.run_id),
            csv_field(&row.run_date),
            csv_field(&row.run_name),
            csv_field(&row.model),
            csv_field(&row.executable),
            row.threads.to_string(),
            row.active_rate.map(|v| v.to_string()).unwrap_or_default(),
            row.inactive_rate.map(|v| v.to_string()).unwrap_or_default(),
        ];
        csv.push_str(&fields.join(","));
        csv.push('\n');
    }
    csv
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(model: &str, exe: &str, run: &str, threads: u32, active: Option<f64>) -> TidyRow {
        TidyRow {
            run_id: run.to_string(),
            run_date: "2025-01-15T10:30:00Z".to_string(),
            run_name: format!("Run {run}"),
            model: model.to_string(),
            executable: exe.to_string(),
            threads,
            active_rate: active,
            inactive_rate: None,
        }
    }

    #[test]
    fn missing_baseline_skips_series_only() {
        let rows = vec![
            row("m", "a", "r1", 5, Some(500.0)),
            row("m", "a", "r1", 10, Some(900.0)),
            row("m", "b", "r1", 1, Some(100.0)),
            row("m", "b", "r1", 5, Some(400.0)),
        ];

        let series = speedup_series(&rows, Metric::ActiveRate);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].executable, "b");
        assert_eq!(comparison(&rows, Metric::ActiveRate).len(), 2);
    }

    #[test]
    fn zero_baseline_is_not_a_baseline() {
        let rows = vec![
            row("m", "a", "r1", 1, Some(0.0)),
            row("m", "a", "r1", 5, Some(10.0)),
        ];
        assert!(speedup_series(&rows, Metric::ActiveRate).is_empty());
    }

    #[test]
    fn best_row_ties_go_to_first_occurrence() {
        let rows = vec![
            row("m", "a", "r1", 1, Some(100.0)),
            row("m", "a", "r1", 5, Some(300.0)),
            row("m", "b", "r1", 5, Some(300.0)),
        ];
        let summary = summarize(&rows, Metric::ActiveRate).unwrap();
        assert_eq!(summary.best.executable, "a");
        assert_eq!(summary.best.threads, 5);
        assert_eq!(summary.min, 100.0);
        assert!((summary.mean - 700.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.executables, vec!["a", "b"]);
    }

    #[test]
    fn summary_of_undefined_metric_is_none() {
        let rows = vec![row("m", "a", "r1", 1, Some(100.0))];
        assert!(summarize(&rows, Metric::InactiveRate).is_none());
    }

    #[test]
    fn csv_quotes_display_names() {
        let mut r = row("m", "a", "r1", 1, Some(1.5));
        r.run_name = "January 15, 2025 at 10:30 AM".to_string();
        let csv = rows_to_csv(&[r]);
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "r1,2025-01-15T10:30:00Z,\"January 15, 2025 at 10:30 AM\",m,a,1,1.5,"
        );
    }

    #[test]
    fn filter_absent_fields_deserialize_as_unrestricted() {
        let filter: QueryFilter = serde_json::from_str(r#"{"metric": "inactive_rate"}"#).unwrap();
        assert!(filter.models.is_empty());
        assert!(filter.runs.is_empty());
        assert_eq!(filter.metric, Metric::InactiveRate);

        let default: QueryFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(default.metric, Metric::ActiveRate);
    }
}
