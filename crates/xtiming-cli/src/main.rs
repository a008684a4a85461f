//! xtiming - X-ray event timing pipeline CLI
//!
//! ## Commands
//!
//! - `calibrate`: energy-calibrate and filter raw events
//! - `lcurve`: bin calibrated events into light curves
//! - `gtis`: cut light curves along GTIs and group the segments
//! - `cache ls` / `cache rm`: inspect or drop cached products
//!
//! Every command prints a JSON summary on stdout; logs go to stderr.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, Level};

use xtiming_core::summary::{
    write_summary_json, CalibrateSummary, CommandSummary, GtisSummary, LightCurveSummary,
};
use xtiming_core::telemetry::init_tracing;
use xtiming_core::{
    ArtifactCache, EnergyWindow, FsCalibrationSource, FsEventSource, MissionConfig, Observation,
    Pipeline, PipelineOptions, ProductKind, TimingConfig, METRICS,
};
use xtiming_store::CacheKey;

#[derive(Parser)]
#[command(name = "xtiming")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Calibrate, bin and GTI-segment X-ray event data", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file (built-in NICER/NuSTAR defaults when omitted)
    #[arg(long, global = true, env = "XTIMING_CONFIG")]
    config: Option<PathBuf>,

    /// Root holding one directory per mission, used with the built-in defaults
    #[arg(long, global = true, env = "XTIMING_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Mission to process (configured default when omitted)
    #[arg(short, long, global = true)]
    mission: Option<String>,

    /// Also write the summary to this file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Observation identifier
    obsid: String,

    /// Instrument(s) to process (all of the mission's when omitted)
    #[arg(short, long = "instrument")]
    instruments: Vec<String>,

    /// Recompute every stage instead of reading cached products
    #[arg(long)]
    overwrite: bool,

    /// Lower bound of the energy window override, keV
    #[arg(long, requires = "energy_max")]
    energy_min: Option<f64>,

    /// Upper bound of the energy window override, keV
    #[arg(long, requires = "energy_min")]
    energy_max: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Energy-calibrate and filter raw events
    Calibrate {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Bin calibrated events into light curves
    Lcurve {
        #[command(flatten)]
        run: RunArgs,

        /// Bin width in seconds
        #[arg(short, long)]
        bin: f64,
    },

    /// Segment light curves along GTIs and group the segments
    Gtis {
        #[command(flatten)]
        run: RunArgs,

        /// Bin width in seconds
        #[arg(short, long)]
        bin: f64,

        /// Minimum GTI length in seconds
        #[arg(long)]
        min_gti: Option<f64>,

        /// Gap in seconds below which consecutive segments share a group
        #[arg(long)]
        group_period: Option<f64>,

        /// Drop segments whose mean count rate is below this (counts/s)
        #[arg(long)]
        min_rate: Option<f64>,
    },

    /// Inspect or drop cached products
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached products of an observation
    Ls {
        /// Observation identifier
        obsid: String,
    },

    /// Remove cached products of an observation
    Rm {
        /// Observation identifier
        obsid: String,

        /// Only this product kind (calib, lc, gtis)
        #[arg(long)]
        kind: Option<ProductKind>,

        /// Only this instrument
        #[arg(short, long)]
        instrument: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let outcome = run(&cli)?;
    println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    if let Some(path) = &cli.output {
        write_summary_json(path, &outcome.summary)
            .with_context(|| format!("write {}", path.display()))?;
    }
    METRICS.flush();

    if outcome.failed > 0 {
        bail!("{} instrument(s) failed", outcome.failed);
    }
    Ok(())
}

/// Printed summary plus the number of failed instruments.
struct Outcome {
    summary: Value,
    failed: usize,
}

impl Outcome {
    fn from_summary<T: Serialize>(summary: &CommandSummary<T>) -> Result<Self> {
        Ok(Self {
            summary: serde_json::to_value(summary)?,
            failed: summary.failures.len(),
        })
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let mut config = load_config(cli)?;

    if let Commands::Gtis {
        min_gti,
        group_period,
        min_rate,
        ..
    } = &cli.command
    {
        let segmentation = &mut config.segmentation;
        if let Some(v) = min_gti {
            segmentation.min_gti_sec = *v;
        }
        if let Some(v) = group_period {
            segmentation.group_period = *v;
        }
        if min_rate.is_some() {
            segmentation.min_count_rate = *min_rate;
        }
        segmentation
            .validate()
            .context("invalid segmentation override")?;
    }

    let mission = config
        .mission(cli.mission.as_deref())
        .context("resolve mission")?;
    let cache = ArtifactCache::open(mission.cache_root())
        .with_context(|| format!("open cache at {}", mission.cache_root().display()))?;

    match &cli.command {
        Commands::Calibrate { run } => cmd_calibrate(&config, mission, &cache, run),
        Commands::Lcurve { run, bin } => cmd_lcurve(&config, mission, &cache, run, *bin),
        Commands::Gtis { run, bin, .. } => cmd_gtis(&config, mission, &cache, run, *bin),
        Commands::Cache { action } => match action {
            CacheAction::Ls { obsid } => cmd_cache_ls(mission, &cache, obsid),
            CacheAction::Rm {
                obsid,
                kind,
                instrument,
            } => cmd_cache_rm(mission, &cache, obsid, *kind, instrument.as_deref()),
        },
    }
}

fn load_config(cli: &Cli) -> Result<TimingConfig> {
    match &cli.config {
        Some(path) => TimingConfig::load(path)
            .with_context(|| format!("load config {}", path.display())),
        None => Ok(TimingConfig::with_default_missions(&cli.data_dir)),
    }
}

fn options(run: &RunArgs) -> Result<PipelineOptions> {
    let energy_window = match (run.energy_min, run.energy_max) {
        (Some(min), Some(max)) => Some(EnergyWindow::new(min, max).context("energy window")?),
        _ => None,
    };
    Ok(PipelineOptions {
        overwrite: run.overwrite,
        energy_window,
    })
}

fn cmd_calibrate(
    config: &TimingConfig,
    mission: &MissionConfig,
    cache: &ArtifactCache,
    run: &RunArgs,
) -> Result<Outcome> {
    let events = FsEventSource::for_mission(mission);
    let pipeline = Pipeline::new(
        config,
        Some(mission.name.as_str()),
        &events,
        &FsCalibrationSource,
        cache,
    )?
    .with_options(options(run)?);
    let obs = Observation::new(&mission.name, &run.obsid);

    let instruments: Vec<&str> = run.instruments.iter().map(String::as_str).collect();
    let results = pipeline.each_instrument(&instruments, |instrument| {
        pipeline.calibrate(&obs, instrument)
    });
    info!(
        obsid = %run.obsid,
        calibrated = results.products.len(),
        failed = results.failures.len(),
        "calibrate finished"
    );
    Outcome::from_summary(&CommandSummary::from_results(&obs, &results, |c| {
        CalibrateSummary::new(c, mission.mjd_ref)
    }))
}

fn cmd_lcurve(
    config: &TimingConfig,
    mission: &MissionConfig,
    cache: &ArtifactCache,
    run: &RunArgs,
    bin: f64,
) -> Result<Outcome> {
    let events = FsEventSource::for_mission(mission);
    let pipeline = Pipeline::new(
        config,
        Some(mission.name.as_str()),
        &events,
        &FsCalibrationSource,
        cache,
    )?
    .with_options(options(run)?);
    let obs = Observation::new(&mission.name, &run.obsid);

    let instruments: Vec<&str> = run.instruments.iter().map(String::as_str).collect();
    let results = pipeline.lcurve(&obs, &instruments, bin);
    Outcome::from_summary(&CommandSummary::from_results(&obs, &results, |c| {
        LightCurveSummary::new(c, mission.mjd_ref)
    }))
}

fn cmd_gtis(
    config: &TimingConfig,
    mission: &MissionConfig,
    cache: &ArtifactCache,
    run: &RunArgs,
    bin: f64,
) -> Result<Outcome> {
    let events = FsEventSource::for_mission(mission);
    let pipeline = Pipeline::new(
        config,
        Some(mission.name.as_str()),
        &events,
        &FsCalibrationSource,
        cache,
    )?
    .with_options(options(run)?);
    let obs = Observation::new(&mission.name, &run.obsid);

    let instruments: Vec<&str> = run.instruments.iter().map(String::as_str).collect();
    let results = pipeline.each_instrument(&instruments, |instrument| {
        pipeline.gtis(&obs, instrument, bin)
    });
    Outcome::from_summary(&CommandSummary::from_results(&obs, &results, GtisSummary::new))
}

#[derive(Serialize)]
struct CacheEntry {
    kind: String,
    instrument: String,
    params: BTreeMap<String, String>,
    location: PathBuf,
}

impl From<&CacheKey> for CacheEntry {
    fn from(key: &CacheKey) -> Self {
        Self {
            kind: key.kind.clone(),
            instrument: key.instrument.clone(),
            params: key.params.clone(),
            location: key.location(),
        }
    }
}

fn cache_listing(mission: &MissionConfig, obsid: &str, field: &str, keys: &[CacheKey]) -> Value {
    let entries: Vec<CacheEntry> = keys.iter().map(CacheEntry::from).collect();
    serde_json::json!({
        "mission": mission.name,
        "obsid": obsid,
        "cache_root": mission.cache_root(),
        field: entries,
    })
}

fn cmd_cache_ls(mission: &MissionConfig, cache: &ArtifactCache, obsid: &str) -> Result<Outcome> {
    let keys = cache
        .entries(&mission.name, obsid)
        .context("list cache entries")?;
    Ok(Outcome {
        summary: cache_listing(mission, obsid, "entries", &keys),
        failed: 0,
    })
}

fn cmd_cache_rm(
    mission: &MissionConfig,
    cache: &ArtifactCache,
    obsid: &str,
    kind: Option<ProductKind>,
    instrument: Option<&str>,
) -> Result<Outcome> {
    let selected: Vec<CacheKey> = cache
        .entries(&mission.name, obsid)
        .context("list cache entries")?
        .into_iter()
        .filter(|key| {
            kind.map_or(true, |k| key.kind == k.as_str())
                && instrument.map_or(true, |i| key.instrument == i)
        })
        .collect();
    let dropped = cache
        .invalidate_many(&selected)
        .context("remove cache entries")?;
    for key in &dropped.removed {
        info!(key = %key, "cache entry removed");
    }

    let mut summary = cache_listing(mission, obsid, "removed", &dropped.removed);
    summary["blocks_removed"] = dropped.blocks_removed.into();
    Ok(Outcome {
        summary,
        failed: 0,
    })
}
