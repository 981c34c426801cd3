use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use volbal_core::{EngineEvent, EventAction, EventType, Position, Side, Trade};

/// Mark-to-market value of the position after one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub equity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceMetrics {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip)]
    pub duration: Duration,
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub equity_peak: Decimal,
    pub total_return: Decimal,
    /// Price return of the asset over the same bars.
    pub buy_hold_return: Decimal,
    pub max_drawdown: Decimal,
    pub num_trades: usize,
    pub num_buys: usize,
    pub num_sells: usize,
    pub total_commission: Decimal,
    pub total_dividends: Decimal,
    pub evaluations: usize,
    pub holds: usize,
}

pub struct MetricsCalculator {
    initial_equity: Decimal,
    first_price: Option<Decimal>,
    equity_curve: Vec<EquityPoint>,
}

impl MetricsCalculator {
    /// Creates a calculator measuring returns against `initial_equity`.
    #[must_use]
    pub const fn new(initial_equity: Decimal) -> Self {
        Self {
            initial_equity,
            first_price: None,
            equity_curve: Vec::new(),
        }
    }

    /// Marks `position` to `price` at `timestamp`: cash, plus quantity at the
    /// close, plus dividends accrued but not yet paid.
    pub fn record(&mut self, timestamp: DateTime<Utc>, price: Decimal, position: &Position) {
        self.first_price.get_or_insert(price);
        self.equity_curve.push(EquityPoint {
            timestamp,
            price,
            equity: position.cash + position.quantity * price + position.dividend_receivable,
        });
    }

    #[must_use]
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    #[must_use]
    pub fn into_equity_curve(self) -> Vec<EquityPoint> {
        self.equity_curve
    }

    /// Summarises the run. `None` until at least one bar was recorded.
    #[must_use]
    pub fn calculate(&self, trades: &[Trade], events: &[EngineEvent], position: &Position) -> Option<PerformanceMetrics> {
        let first = self.equity_curve.first()?;
        let last = self.equity_curve.last()?;

        let total_return = ratio(last.equity - self.initial_equity, self.initial_equity);
        let buy_hold_return = self
            .first_price
            .map_or(Decimal::ZERO, |p| ratio(last.price - p, p));

        let evaluations: Vec<&EngineEvent> = events
            .iter()
            .filter(|e| e.event_type == EventType::Evaluation)
            .collect();

        Some(PerformanceMetrics {
            start_time: first.timestamp,
            end_time: last.timestamp,
            duration: last.timestamp - first.timestamp,
            initial_equity: self.initial_equity,
            final_equity: last.equity,
            equity_peak: self
                .equity_curve
                .iter()
                .map(|p| p.equity)
                .fold(self.initial_equity, Decimal::max),
            total_return,
            buy_hold_return,
            max_drawdown: self.max_drawdown(),
            num_trades: trades.len(),
            num_buys: trades.iter().filter(|t| t.side == Side::Buy).count(),
            num_sells: trades.iter().filter(|t| t.side == Side::Sell).count(),
            total_commission: trades.iter().map(|t| t.commission).sum(),
            total_dividends: position.total_dividends_received,
            evaluations: evaluations.len(),
            holds: evaluations.iter().filter(|e| e.action == EventAction::Hold).count(),
        })
    }

    /// Largest peak-to-trough fall, as a fraction of the peak.
    fn max_drawdown(&self) -> Decimal {
        let mut max_drawdown = Decimal::ZERO;
        let mut peak = self.initial_equity;

        for point in &self.equity_curve {
            if point.equity > peak {
                peak = point.equity;
            }
            let drawdown = ratio(peak - point.equity, peak);
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        max_drawdown
    }
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}
