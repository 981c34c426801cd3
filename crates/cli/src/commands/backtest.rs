//! Backtest CLI command.
//!
//! Loads bars from CSV, replays them through the same tick engine the live
//! loop uses and prints the performance report. Optionally writes every
//! evaluation and lifecycle event to a JSON-lines journal.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use volbal_backtest::{HistoricalBars, MetricsFormatter, SimulationConfig, SimulationResult, SimulationRunner};
use volbal_core::{BarInterval, ConfigLoader, DividendAnnouncement, EventLogger};
use volbal_execution::JsonLinesEventLog;

/// Arguments for the backtest command.
#[derive(Args, Debug, Clone)]
pub struct BacktestArgs {
    /// Historical bars CSV (timestamp,symbol,open,high,low,close,volume)
    #[arg(short, long)]
    pub data: PathBuf,

    /// Symbol to replay. Defaults to the first symbol in the file.
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Starting cash
    #[arg(long, default_value = "10000")]
    pub cash: Decimal,

    /// Starting share quantity
    #[arg(long, default_value = "0")]
    pub quantity: Decimal,

    /// Starting anchor price. Defaults to the first close.
    #[arg(long)]
    pub anchor: Option<Decimal>,

    /// First bar to replay (RFC 3339). Defaults to the start of the file.
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,

    /// Last bar to replay (RFC 3339). Defaults to the end of the file.
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,

    /// Bar interval to replay at (1m, 5m, 15m, 1h, 4h, 1d)
    #[arg(long, default_value = "1d")]
    pub interval: BarInterval,

    /// JSON file with an array of dividend announcements
    #[arg(long)]
    pub dividends: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml", env = "VOLBAL_CONFIG")]
    pub config: PathBuf,

    /// Append every logged event to this JSON-lines file
    #[arg(long)]
    pub events_out: Option<PathBuf>,

    /// Print metrics as JSON instead of the text report
    #[arg(long)]
    pub json: bool,
}

/// Runs the backtest command.
///
/// # Errors
/// Returns an error if the config, bars or dividends cannot be loaded, the
/// replay fails, or the journal cannot be written.
pub async fn run_backtest(args: BacktestArgs) -> Result<()> {
    tracing::info!(
        data = %args.data.display(),
        config = %args.config.display(),
        "Running backtest"
    );

    let result = replay(&args).await?;
    let symbol = &result.final_position.symbol;

    if let Some(path) = &args.events_out {
        let written = write_journal(path, &result).await?;
        tracing::info!(path = %path.display(), events = written, "Event journal written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.metrics)?);
    } else {
        println!("{}", MetricsFormatter::format(symbol, &result.metrics));
    }

    Ok(())
}

async fn replay(args: &BacktestArgs) -> Result<SimulationResult> {
    let config = ConfigLoader::load_from(&args.config)?;
    let provider = HistoricalBars::from_csv(&args.data)?;
    let sim = simulation_config(args, &provider)?;

    tracing::info!(
        symbol = %sim.symbol,
        start = %sim.start,
        end = %sim.end,
        interval = %String::from(sim.interval),
        dividends = sim.dividends.len(),
        "Replaying"
    );

    let runner = SimulationRunner::new(config)?;
    runner
        .run(&provider, &sim)
        .await
        .with_context(|| format!("Replay of {} failed", sim.symbol))
}

fn simulation_config(args: &BacktestArgs, provider: &HistoricalBars) -> Result<SimulationConfig> {
    let symbol = match &args.symbol {
        Some(symbol) => symbol.clone(),
        None => provider
            .symbols()
            .into_iter()
            .next()
            .with_context(|| format!("No bars found in {}", args.data.display()))?,
    };
    let (first, last) = provider
        .span()
        .with_context(|| format!("No bars found in {}", args.data.display()))?;

    let dividends = match &args.dividends {
        Some(path) => load_dividends(path)?,
        None => Vec::new(),
    };

    Ok(SimulationConfig {
        symbol,
        start: args.start.unwrap_or(first),
        end: args.end.unwrap_or(last),
        interval: args.interval,
        initial_cash: args.cash,
        initial_quantity: args.quantity,
        initial_anchor: args.anchor,
        dividends,
    })
}

fn load_dividends(path: &Path) -> Result<Vec<DividendAnnouncement>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dividends file: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse dividends file: {}", path.display()))
}

async fn write_journal(path: &Path, result: &SimulationResult) -> Result<usize> {
    let journal = JsonLinesEventLog::open(path)
        .await
        .with_context(|| format!("Failed to open event journal: {}", path.display()))?;
    for event in &result.events {
        journal.append(event.clone()).await?;
    }
    Ok(result.events.len())
}
