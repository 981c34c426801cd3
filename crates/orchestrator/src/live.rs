use crate::tick::{TickEngine, TickReport};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};
use volbal_core::{EngineError, EventAction, PositionKey};
use volbal_execution::{DividendProcessor, DividendRunSummary, FillOutcome};

/// Counts from one pass over every position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub evaluated: usize,
    pub holds: usize,
    pub filled: usize,
    pub skipped: usize,
    pub rejected: usize,
    /// Ticks that could not even record a HOLD (missing position, broken ledger).
    pub failed: usize,
}

impl CycleSummary {
    fn record(&mut self, report: &TickReport) {
        self.evaluated += 1;
        match (&report.fill, report.action) {
            (Some(FillOutcome::Filled { .. }), _) => self.filled += 1,
            (_, EventAction::Skip) => self.skipped += 1,
            (_, EventAction::Reject) => self.rejected += 1,
            _ => self.holds += 1,
        }
    }

    fn absorb(&mut self, joined: Result<Result<TickReport, (PositionKey, EngineError)>, JoinError>) {
        match joined {
            Ok(Ok(report)) => self.record(&report),
            Ok(Err((key, e))) => {
                error!(position = %key, error = %e, "tick failed");
                self.failed += 1;
            }
            Err(e) => {
                error!(error = %e, "tick task aborted");
                self.failed += 1;
            }
        }
    }
}

/// Live variant: ticks every position concurrently on each cycle and runs
/// the dividend pass on its own schedule.
pub struct LiveOrchestrator {
    engine: Arc<TickEngine>,
    dividends: DividendProcessor,
    max_concurrent_ticks: usize,
}

impl LiveOrchestrator {
    #[must_use]
    pub fn new(engine: Arc<TickEngine>, max_concurrent_ticks: usize) -> Self {
        let dividends = engine.dividend_processor();
        Self {
            engine,
            dividends,
            max_concurrent_ticks: max_concurrent_ticks.max(1),
        }
    }

    #[must_use]
    pub const fn engine(&self) -> &Arc<TickEngine> {
        &self.engine
    }

    #[must_use]
    pub const fn dividends(&self) -> &DividendProcessor {
        &self.dividends
    }

    /// Ticks every known position, at most `max_concurrent_ticks` at once.
    /// Positions are independent: one failing or stalling never stops the rest.
    ///
    /// # Errors
    ///
    /// Returns an error only if the positions cannot be listed.
    pub async fn run_cycle(&self) -> Result<CycleSummary, EngineError> {
        let positions = self.engine.ledger().list().await?;
        let mut summary = CycleSummary::default();
        let mut ticks = JoinSet::new();

        for position in positions {
            while ticks.len() >= self.max_concurrent_ticks {
                match ticks.join_next().await {
                    Some(joined) => summary.absorb(joined),
                    None => break,
                }
            }
            let engine = Arc::clone(&self.engine);
            ticks.spawn(async move {
                let key = position.key;
                engine.tick(&key).await.map_err(|e| (key, e))
            });
        }
        while let Some(joined) = ticks.join_next().await {
            summary.absorb(joined);
        }

        info!(
            evaluated = summary.evaluated,
            holds = summary.holds,
            filled = summary.filled,
            skipped = summary.skipped,
            rejected = summary.rejected,
            failed = summary.failed,
            "cycle complete"
        );
        Ok(summary)
    }

    /// Accrues and pays whatever dividends are due at the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns an error only if the ledger cannot be listed.
    pub async fn run_dividends(&self) -> Result<DividendRunSummary, EngineError> {
        self.dividends.process_due(self.engine.clock().now()).await
    }
}
