use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant + portfolio + position scope. Every lock, idempotency key and
/// event is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub tenant_id: String,
    pub portfolio_id: String,
    pub position_id: String,
}

impl PositionKey {
    pub fn new(
        tenant_id: impl Into<String>,
        portfolio_id: impl Into<String>,
        position_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            portfolio_id: portfolio_id.into(),
            position_id: position_id.into(),
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.tenant_id, self.portfolio_id, self.position_id
        )
    }
}

/// A single asset holding plus the cash set aside for trading it.
///
/// Only fills and dividend payments change `quantity` and `cash`. The
/// orchestrator may move `anchor_price` when it detects a stale reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(flatten)]
    pub key: PositionKey,
    pub symbol: String,
    pub quantity: Decimal,
    pub cash: Decimal,
    pub anchor_price: Option<Decimal>,
    pub avg_cost: Option<Decimal>,
    pub total_commission_paid: Decimal,
    pub total_dividends_received: Decimal,
    /// Net dividends accrued at ex-date and not yet paid.
    #[serde(default)]
    pub dividend_receivable: Decimal,
    /// Optimistic concurrency token, bumped by every successful save.
    #[serde(default)]
    pub version: u64,
}

impl Position {
    #[must_use]
    pub fn new(key: PositionKey, symbol: impl Into<String>, quantity: Decimal, cash: Decimal) -> Self {
        Self {
            key,
            symbol: symbol.into(),
            quantity,
            cash,
            anchor_price: None,
            avg_cost: None,
            total_commission_paid: Decimal::ZERO,
            total_dividends_received: Decimal::ZERO,
            dividend_receivable: Decimal::ZERO,
            version: 0,
        }
    }

    #[must_use]
    pub fn with_anchor(mut self, anchor: Decimal) -> Self {
        self.anchor_price = Some(anchor);
        self
    }

    #[must_use]
    pub fn stock_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    /// Stock value plus cash at `price`.
    #[must_use]
    pub fn total_value(&self, price: Decimal) -> Decimal {
        self.stock_value(price) + self.cash
    }

    /// Fraction of total value held in stock, `None` when the position is empty.
    #[must_use]
    pub fn stock_allocation(&self, price: Decimal) -> Option<Decimal> {
        let total = self.total_value(price);
        if total <= Decimal::ZERO {
            return None;
        }
        Some(self.stock_value(price) / total)
    }
}
