//! Simulation variant of the orchestrator.
//!
//! Each run builds its own ledger, journal and config store, replays the
//! bars one at a time through the same [`TickEngine`] the live loop uses, and
//! never touches anything outside those stores. The same bars and settings
//! always produce the same trades.

use crate::metrics::{EquityPoint, MetricsCalculator, PerformanceMetrics};
use crate::replay::{ReplayClock, ReplayQuoteProvider};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};
use volbal_core::{
    AppConfig, BarInterval, DividendAnnouncement, EngineError, EngineEvent, HistoricalDataProvider, Position,
    PositionKey, PositionRepository, Trade,
};
use volbal_execution::{InMemoryEventLog, InMemoryLedger, PositionLocks, RetryPolicy, StaticConfigStore};
use volbal_orchestrator::{EnginePorts, TickEngine, TickReport};

const SIMULATION_TENANT: &str = "simulation";
const SIMULATION_PORTFOLIO: &str = "replay";

/// What to replay and the position to start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: BarInterval,
    pub initial_cash: Decimal,
    pub initial_quantity: Decimal,
    /// When absent the first bar's close seeds the anchor.
    pub initial_anchor: Option<Decimal>,
    pub dividends: Vec<DividendAnnouncement>,
}

impl SimulationConfig {
    #[must_use]
    pub fn position_key(&self) -> PositionKey {
        PositionKey::new(SIMULATION_TENANT, SIMULATION_PORTFOLIO, self.symbol.to_lowercase())
    }
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub reports: Vec<TickReport>,
    pub trades: Vec<Trade>,
    pub events: Vec<EngineEvent>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_position: Position,
    pub metrics: PerformanceMetrics,
}

pub struct SimulationRunner {
    config: AppConfig,
}

impl SimulationRunner {
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` does not validate.
    pub fn new(config: AppConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Replays `sim.symbol` between `sim.start` and `sim.end`.
    ///
    /// Per bar: move the clock to the bar, publish its close as the quote,
    /// settle any dividends due that day, then tick once.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] if the provider has no bars in range or
    ///   the starting position is invalid
    /// - any error from the provider or a dividend announcement
    pub async fn run(
        &self,
        provider: &dyn HistoricalDataProvider,
        sim: &SimulationConfig,
    ) -> Result<SimulationResult, EngineError> {
        if sim.initial_cash < Decimal::ZERO || sim.initial_quantity < Decimal::ZERO {
            return Err(EngineError::Validation(
                "initial cash and quantity must not be negative".to_string(),
            ));
        }
        let bars = provider.get_bars(&sim.symbol, sim.start, sim.end, sim.interval).await?;
        let Some(first) = bars.first() else {
            return Err(EngineError::Validation(format!(
                "no {} bars between {} and {}",
                sim.symbol, sim.start, sim.end
            )));
        };

        let key = sim.position_key();
        let mut position = Position::new(key.clone(), &sim.symbol, sim.initial_quantity, sim.initial_cash);
        position.anchor_price = sim.initial_anchor;

        let ledger = Arc::new(InMemoryLedger::with_positions([position]));
        let events = Arc::new(InMemoryEventLog::new());
        let clock = Arc::new(ReplayClock::new(first.timestamp));
        let quotes = Arc::new(ReplayQuoteProvider::new());
        let engine = TickEngine::new(
            EnginePorts {
                ledger: ledger.clone(),
                events: events.clone(),
                config: Arc::new(StaticConfigStore::new(self.config.clone())),
                market: quotes.clone(),
                clock: clock.clone(),
            },
            PositionLocks::new(),
            RetryPolicy::none(),
        );
        let dividends = engine.dividend_processor();
        for announcement in &sim.dividends {
            dividends.announce(announcement.clone()).await?;
        }

        info!(
            symbol = %sim.symbol,
            bars = bars.len(),
            start = %first.timestamp,
            "starting replay"
        );

        let initial_equity = sim.initial_cash + sim.initial_quantity * first.close;
        let mut metrics = MetricsCalculator::new(initial_equity);
        let mut reports = Vec::with_capacity(bars.len());

        for bar in &bars {
            clock.set(bar.timestamp);
            quotes.advance(bar);

            let settled = dividends.process_due(bar.timestamp).await?;
            if settled.accrued + settled.paid > 0 {
                debug!(at = %bar.timestamp, accrued = settled.accrued, paid = settled.paid, "dividends settled");
            }

            let report = engine.tick(&key).await?;
            let position = load(ledger.as_ref(), &key).await?;
            metrics.record(bar.timestamp, bar.close, &position);
            reports.push(report);
        }

        let final_position = load(ledger.as_ref(), &key).await?;
        let trades = ledger.all_trades().await;
        let events = events.events().await;
        let summary = metrics
            .calculate(&trades, &events, &final_position)
            .ok_or_else(|| EngineError::Validation("replay recorded no bars".to_string()))?;

        info!(
            symbol = %sim.symbol,
            trades = summary.num_trades,
            total_return = %summary.total_return,
            max_drawdown = %summary.max_drawdown,
            "replay complete"
        );

        Ok(SimulationResult {
            reports,
            trades,
            events,
            equity_curve: metrics.into_equity_curve(),
            final_position,
            metrics: summary,
        })
    }
}

async fn load(ledger: &InMemoryLedger, key: &PositionKey) -> Result<Position, EngineError> {
    ledger
        .get(key)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("position {key}")))
}
