//! SigOpt CLI: run the optimizer and inspect its inputs and outputs.
//!
//! Commands:
//! - `optimize`: run the multi-phase optimization and publish the result
//! - `identify`: report opportunity counts for a snapshot directory
//! - `show`: print the currently accepted configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sigopt_core::domain::SignalType;
use sigopt_core::identify_all;
use sigopt_runner::store::apply_lookback;
use sigopt_runner::{
    ConfigStore, CsvSnapshotStore, HttpAdvisory, JsonFileConfigStore, JsonlAuditLog, NoAdvisory,
    Optimizer, OptimizerConfig, ParameterAdvisory, RunReport, RunStatus, SnapshotStore,
    StaticAdvisory,
};

#[derive(Parser)]
#[command(
    name = "sigopt",
    about = "SigOpt: multi-phase strategy parameter optimizer"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run identification, Phases 2-4 and publish the accepted configs.
    Optimize {
        /// Optimizer config (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory of <SYMBOL>.csv snapshot files.
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Accepted-config JSON file.
        #[arg(long, default_value = "state/accepted.json")]
        store: PathBuf,

        /// Audit log (JSON lines).
        #[arg(long, default_value = "state/audit.jsonl")]
        audit: PathBuf,

        /// JSON file of suggested parameter deltas per signal type.
        #[arg(long, conflicts_with = "advisory_url")]
        advisory_file: Option<PathBuf>,

        /// HTTP endpoint returning suggested parameter deltas.
        #[arg(long)]
        advisory_url: Option<String>,

        /// Advisory request timeout in seconds.
        #[arg(long, default_value_t = 10)]
        advisory_timeout_secs: u64,

        /// Lookback window measured back from the newest snapshot.
        #[arg(long, default_value_t = 336)]
        lookback_hours: i64,

        /// Signal types to optimize (repeatable). Defaults to all.
        #[arg(long = "signal-type")]
        signal_types: Vec<SignalType>,

        /// Evaluate candidates on the current thread only.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Print the full run report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Report opportunity counts for a snapshot directory.
    Identify {
        /// Directory of <SYMBOL>.csv snapshot files.
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Optimizer config (TOML) for the identification thresholds.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Lookback window measured back from the newest snapshot.
        #[arg(long, default_value_t = 336)]
        lookback_hours: i64,
    },
    /// Print the currently accepted configuration.
    Show {
        /// Accepted-config JSON file.
        #[arg(long, default_value = "state/accepted.json")]
        store: PathBuf,

        /// Also print the last N provenance records.
        #[arg(long, default_value_t = 0)]
        history: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize {
            config,
            data,
            store,
            audit,
            advisory_file,
            advisory_url,
            advisory_timeout_secs,
            lookback_hours,
            signal_types,
            sequential,
            json,
        } => {
            let advisory = build_advisory(
                advisory_file.as_deref(),
                advisory_url,
                advisory_timeout_secs,
            )?;
            let report = run_optimize(
                config.as_deref(),
                data,
                store,
                audit,
                advisory,
                lookback_hours,
                signal_types,
                sequential,
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if report.status == RunStatus::Failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Identify {
            data,
            config,
            lookback_hours,
        } => run_identify(&data, config.as_deref(), lookback_hours),
        Commands::Show { store, history } => run_show(store, history),
    }
}

fn load_config(path: Option<&Path>) -> Result<OptimizerConfig> {
    match path {
        Some(path) => OptimizerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(OptimizerConfig::default()),
    }
}

fn lookback(hours: i64) -> Result<chrono::Duration> {
    if hours <= 0 {
        bail!("--lookback-hours must be positive, got {hours}");
    }
    match chrono::Duration::try_hours(hours) {
        Some(window) => Ok(window),
        None => bail!("--lookback-hours {hours} is out of range"),
    }
}

fn build_advisory(
    file: Option<&Path>,
    url: Option<String>,
    timeout_secs: u64,
) -> Result<Arc<dyn ParameterAdvisory>> {
    Ok(match (file, url) {
        (Some(path), _) => Arc::new(
            StaticAdvisory::from_file(path)
                .with_context(|| format!("loading suggestions {}", path.display()))?,
        ),
        (None, Some(url)) => Arc::new(HttpAdvisory::new(url, StdDuration::from_secs(timeout_secs))?),
        (None, None) => Arc::new(NoAdvisory),
    })
}

#[allow(clippy::too_many_arguments)]
fn run_optimize(
    config_path: Option<&Path>,
    data: PathBuf,
    store: PathBuf,
    audit: PathBuf,
    advisory: Arc<dyn ParameterAdvisory>,
    lookback_hours: i64,
    signal_types: Vec<SignalType>,
    sequential: bool,
) -> Result<RunReport> {
    let config = load_config(config_path)?;
    let window = lookback(lookback_hours)?;
    let signal_types = if signal_types.is_empty() {
        SignalType::ALL.to_vec()
    } else {
        signal_types
    };

    info!(data = %data.display(), store = %store.display(), "starting optimization");
    let optimizer = Optimizer::new(
        config,
        Arc::new(CsvSnapshotStore::new(data)),
        advisory,
        Arc::new(JsonFileConfigStore::new(store)),
        Arc::new(JsonlAuditLog::new(audit)),
    )?
    .with_parallelism(!sequential);

    Ok(optimizer.run_optimization(window, &signal_types)?)
}

fn print_report(report: &RunReport) {
    println!();
    println!("=== Optimization Run {} ===", report.run_id.short());
    println!("Status:        {}", report.status);
    println!("Snapshots:     {} ({} skipped)", report.snapshots, report.skipped_ticks);
    println!("Lookback:      {}h", report.lookback_hours);
    println!("Advisory:      {}", if report.advisory_used { "used" } else { "none" });
    println!();

    for (st, per_type) in &report.per_type {
        println!("--- {st} ---");
        println!("  Opportunities:  {}", per_type.opportunities);
        println!("  Status:         {}", per_type.status);
        if let Some(baseline) = &per_type.baseline {
            println!(
                "  Phase 2:        score {:.3}, capture {:.1}%, avg profit {:.3}%",
                baseline.score,
                baseline.result.capture_rate() * 100.0,
                baseline.result.avg_profit
            );
        }
        if let Some(refined) = &per_type.refined {
            println!(
                "  Phase 3:        {} (score {:.3}, {} suggestions)",
                refined.origin.label(),
                refined.score,
                per_type.suggestions
            );
        }
        if let Some(resolution) = &per_type.resolution {
            for (state, validation) in &resolution.validations {
                println!(
                    "  Phase 4:        {state:?} -> {} (stability {:.1}, overfit {})",
                    validation.verdict, validation.stability_score, validation.overfitting_score
                );
            }
        }
    }

    println!();
    for (st, accepted) in &report.accepted {
        let p = accepted.params;
        println!(
            "{st:<9} [{}{}] rr>={:.2} score>={:.0} cons>={} stop={:.2}xATR tp={:.2}xATR hold={}",
            accepted.source,
            if accepted.flagged { ", flagged" } else { "" },
            p.min_risk_reward(),
            p.min_signal_score(),
            p.min_indicator_consensus(),
            p.atr_stop_multiplier(),
            p.atr_tp_multiplier(),
            p.max_holding_periods()
        );
    }
    if let Some(err) = &report.publish_error {
        println!();
        println!("Publish failed: {err}");
    }
}

fn run_identify(data: &Path, config_path: Option<&Path>, lookback_hours: i64) -> Result<()> {
    let config = load_config(config_path)?;
    let store = CsvSnapshotStore::new(data);
    let snapshots = apply_lookback(store.load_all()?, lookback(lookback_hours)?);
    let report = identify_all(&snapshots, &config.opportunity);

    println!("Snapshots scanned: {}", report.scanned);
    println!("Skipped (bad fields): {}", report.skipped);
    for st in SignalType::ALL {
        let opps = report.of_type(st);
        let avg_objective = if opps.is_empty() {
            0.0
        } else {
            opps.iter().map(|o| o.objective_profit).sum::<f64>() / opps.len() as f64
        };
        println!(
            "{st:<9} {:>6} opportunities, avg objective profit {:.2}%",
            opps.len(),
            avg_objective
        );
    }
    Ok(())
}

fn run_show(path: PathBuf, history: usize) -> Result<()> {
    let store = JsonFileConfigStore::new(path);
    let Some(record) = store.load()? else {
        bail!("no accepted configuration at {}", store.path().display());
    };
    println!("{}", serde_json::to_string_pretty(&record)?);

    if history > 0 {
        let trail = store.read_provenance()?;
        let start = trail.len().saturating_sub(history);
        println!();
        for entry in &trail[start..] {
            println!(
                "{}  {}  {}  {}",
                entry.published_at,
                entry.run_id.short(),
                entry.status,
                &entry.params_hash[..entry.params_hash.len().min(12)]
            );
        }
    }
    Ok(())
}
