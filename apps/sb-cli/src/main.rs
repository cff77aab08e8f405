mod logging;

use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sb_app::{
    AppError, AppResult, PlanOptions, PlanProgressEvent, PlanStage, QueryFilter, QueryOutcome,
    QueryReport, RunDiscovery,
};
use sb_results::Metric;
use sb_sweep::CommandEngine;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "scalebench")]
#[command(about = "Thread-scaling benchmarks for particle transport executables", long_about = None)]
struct Cli {
    /// Log level for scalebench crates (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sweep plan and write a new run artifact
    Sweep {
        /// Path to the sweep config (YAML or JSON)
        #[arg(long)]
        config: PathBuf,
        /// Reuse cached sweeps regardless of the config
        #[arg(long, conflicts_with = "no_cache")]
        use_cache: bool,
        /// Recompute every sweep and overwrite the cache
        #[arg(long)]
        no_cache: bool,
        /// Only run these models
        #[arg(long = "model")]
        models: Vec<String>,
        /// Only run these executables
        #[arg(long = "executable")]
        executables: Vec<String>,
    },
    /// List valid runs, most recent first
    Runs {
        #[arg(long, env = "SCALEBENCH_RESULTS_DIR", default_value = "results/runs")]
        root: PathBuf,
    },
    /// Report invalid run artifacts
    Validate {
        #[arg(long, env = "SCALEBENCH_RESULTS_DIR", default_value = "results/runs")]
        root: PathBuf,
    },
    /// Filter runs and print derived metrics
    Query {
        #[arg(long, env = "SCALEBENCH_RESULTS_DIR", default_value = "results/runs")]
        root: PathBuf,
        #[arg(long = "model")]
        models: Vec<String>,
        #[arg(long = "executable")]
        executables: Vec<String>,
        #[arg(long = "run")]
        runs: Vec<String>,
        #[arg(long, value_enum, default_value_t = MetricArg::ActiveRate)]
        metric: MetricArg,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Inspect or clear the sweep cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cached (model, executable) pairs
    List {
        #[arg(long)]
        config: PathBuf,
    },
    /// Remove cached sweeps
    Clear {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        executable: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    #[value(name = "active_rate")]
    ActiveRate,
    #[value(name = "inactive_rate")]
    InactiveRate,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::ActiveRate => Metric::ActiveRate,
            MetricArg::InactiveRate => Metric::InactiveRate,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level, &cli.log_format);

    match cli.command {
        Commands::Sweep {
            config,
            use_cache,
            no_cache,
            models,
            executables,
        } => {
            let use_cache = match (use_cache, no_cache) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd_sweep(&config, use_cache, models, executables)
        }
        Commands::Runs { root } => cmd_runs(&root),
        Commands::Validate { root } => cmd_validate(&root),
        Commands::Query {
            root,
            models,
            executables,
            runs,
            metric,
            format,
            output,
        } => {
            let filter = QueryFilter {
                models,
                executables,
                runs,
                metric: metric.into(),
            };
            cmd_query(&root, &filter, format, output.as_deref())
        }
        Commands::Cache(CacheCommands::List { config }) => cmd_cache_list(&config),
        Commands::Cache(CacheCommands::Clear {
            config,
            model,
            executable,
        }) => cmd_cache_clear(&config, model.as_deref(), executable.as_deref()),
    }
}

fn cmd_sweep(
    config_path: &Path,
    use_cache: Option<bool>,
    models: Vec<String>,
    executables: Vec<String>,
) -> AppResult<()> {
    let config = sb_app::load_sweep_config(config_path)?;
    let options = PlanOptions {
        use_cache,
        models,
        executables,
        now: None,
    };

    let engine = CommandEngine::new();
    let mut progress = |event: PlanProgressEvent| render_cli_progress(&event);
    let response =
        sb_app::execute_plan_with_progress(&config, &engine, &options, Some(&mut progress));
    clear_progress_line();
    let response = response?;
    info!(
        run_id = %response.run_id,
        run_dir = %response.run_dir.display(),
        "run artifact written"
    );

    println!("✓ Run {} written to {}", response.run_id, response.run_dir.display());
    println!(
        "  Pairs: {} ({} from cache)",
        response.pairs, response.loaded_from_cache
    );
    if response.failed_points > 0 {
        println!(
            "  Failed points: {} (rates left undefined)",
            response.failed_points
        );
    }
    println!("  Elapsed: {:.1} s", response.elapsed_wall_s);
    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(120));
    let _ = io::stdout().flush();
}

fn render_cli_progress(event: &PlanProgressEvent) {
    let pair = match (&event.model, &event.executable) {
        (Some(model), Some(executable)) => format!("{model}/{executable}"),
        _ => String::new(),
    };
    let mut line = format!(
        "\r[{}/{}] {:<16} {}",
        (event.pair_index + 1).min(event.pair_count),
        event.pair_count,
        stage_label(event.stage),
        pair
    );
    if let Some(sweep) = &event.sweep {
        line.push_str(&format!(
            "  threads={} ({}/{})  repeat={}/{}",
            sweep.threads,
            sweep.point_index + 1,
            sweep.point_count,
            sweep.repetition + 1,
            sweep.n_repeats
        ));
    }
    if let Some(msg) = &event.message {
        line.push_str(&format!("  {msg}"));
    }
    line.push_str(&format!("  elapsed={:.1}s", event.elapsed_wall_s));
    print!("{line}");
    let _ = io::stdout().flush();
}

fn stage_label(stage: PlanStage) -> &'static str {
    match stage {
        PlanStage::CheckingCache => "checking cache",
        PlanStage::LoadedFromCache => "cached",
        PlanStage::Sweeping => "sweeping",
        PlanStage::WritingArtifact => "writing run",
        PlanStage::Completed => "done",
    }
}

fn cmd_runs(root: &Path) -> AppResult<()> {
    let discovery = RunDiscovery::open(root)?;
    let catalog = discovery.catalog();

    if catalog.is_empty() {
        println!("No valid runs under {}", root.display());
        return Ok(());
    }

    println!("Runs under {}:", root.display());
    for run in catalog.runs() {
        let config = run.config();
        println!(
            "  {}  {}  models={} executables={}",
            run.id(),
            run.display_name(),
            config.models.len(),
            config.executables.len()
        );
    }
    if !catalog.invalid().is_empty() {
        println!(
            "\n{} invalid run(s) skipped; see `validate`",
            catalog.invalid().len()
        );
    }
    Ok(())
}

fn cmd_validate(root: &Path) -> AppResult<()> {
    let discovery = RunDiscovery::open(root)?;
    let catalog = discovery.catalog();

    for run in catalog.runs() {
        let gaps = run.coverage_gaps();
        if gaps.is_empty() {
            println!("✓ {}", run.id());
        } else {
            println!("✓ {} (declared without results: {})", run.id(), format_gaps(&gaps));
        }
    }
    for invalid in catalog.invalid() {
        println!("✗ {}: {}", invalid.path.display(), invalid.reason);
    }

    println!(
        "\n{} valid, {} invalid",
        catalog.len(),
        catalog.invalid().len()
    );
    Ok(())
}

fn format_gaps(gaps: &[(String, String)]) -> String {
    gaps.iter()
        .map(|(model, executable)| format!("{model}/{executable}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn cmd_query(
    root: &Path,
    filter: &QueryFilter,
    format: OutputFormat,
    output: Option<&Path>,
) -> AppResult<()> {
    let discovery = RunDiscovery::open(root)?;
    let outcome = sb_app::query(discovery.catalog(), filter);

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&outcome)
            .map_err(|e| AppError::Results(e.to_string()))?,
        OutputFormat::Csv => match &outcome {
            QueryOutcome::Data(report) => sb_app::rows_to_csv(&report.rows),
            QueryOutcome::NoData { reason } => {
                eprintln!("{}", reason.message());
                sb_app::rows_to_csv(&[])
            }
        },
        OutputFormat::Text => match &outcome {
            QueryOutcome::Data(report) => render_report(report),
            QueryOutcome::NoData { reason } => format!("{}\n", reason.message()),
        },
    };

    if let QueryOutcome::NoData { reason } = &outcome {
        warn!(root = %root.display(), reason = ?reason, "query returned no data");
    }
    if let Some(path) = output {
        std::fs::write(path, rendered)?;
        println!("✓ Wrote query result to {}", path.display());
    } else {
        print!("{rendered}");
    }
    Ok(())
}

fn render_report(report: &QueryReport) -> String {
    let summary = &report.summary;
    let label = summary.metric.label();
    let mut out = String::new();

    out.push_str(&format!("{label} summary ({} rows)\n", summary.row_count));
    out.push_str(&format!(
        "  max={:.1}  min={:.1}  mean={:.1}\n",
        summary.max, summary.min, summary.mean
    ));
    out.push_str(&format!(
        "  best: {}/{} at {} threads = {:.1} (run {})\n",
        summary.best.model,
        summary.best.executable,
        summary.best.threads,
        summary.best.value,
        summary.best.run_id
    ));
    out.push_str(&format!("  runs: {}\n", summary.runs.join("; ")));

    out.push_str(&format!("\nMaximum {label}\n"));
    for entry in &report.comparison {
        out.push_str(&format!(
            "  {:<24} {:<16} {:>14.1}\n",
            entry.model, entry.executable, entry.max_value
        ));
    }

    out.push_str(&format!(
        "\nSpeedup (ideal up to {} threads)\n",
        report.ideal_speedup.max_threads
    ));
    for series in &report.speedup_series {
        out.push_str(&format!(
            "  {}/{} [{}]\n",
            series.model, series.executable, series.run_name
        ));
        for ((threads, speedup), efficiency) in series
            .threads
            .iter()
            .zip(&series.speedup)
            .zip(&series.efficiency)
        {
            out.push_str(&format!(
                "    {threads:>4} threads  speedup={speedup:>7.2}  efficiency={efficiency:>5.2}\n"
            ));
        }
    }
    out
}

fn cmd_cache_list(config_path: &Path) -> AppResult<()> {
    let config = sb_app::load_sweep_config(config_path)?;
    let entries = sb_app::list_cache(&config)?;

    if entries.is_empty() {
        println!("No cached sweeps in {}", config.cache_dir.display());
    } else {
        println!("Cached sweeps in {}:", config.cache_dir.display());
        for (model, executable) in entries {
            println!("  {model}/{executable}");
        }
    }
    Ok(())
}

fn cmd_cache_clear(
    config_path: &Path,
    model: Option<&str>,
    executable: Option<&str>,
) -> AppResult<()> {
    let config = sb_app::load_sweep_config(config_path)?;
    let removed = sb_app::clear_cache(&config, model, executable)?;
    println!("✓ Removed {removed} cached sweep(s)");
    Ok(())
}
