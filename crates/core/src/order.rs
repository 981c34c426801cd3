use crate::error::EngineError;
use crate::position::PositionKey;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const ORDER_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_3c2a_8e4b_4f0a_9c57_1b2e_d4a6_0c11);
const TRADE_NAMESPACE: Uuid = Uuid::from_u128(0x2b8e_91d4_7a63_4c5e_b0f2_58a9_e13c_7d42);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("BUY"),
            Self::Sell => f.write_str("SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(EngineError::Validation(format!("unknown side '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Submitted,
    Filled,
    Rejected,
    Skipped,
}

impl OrderStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Submitted)
    }
}

/// Only immediate fills at a supplied price are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricePolicy {
    #[default]
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    /// Order ids are derived from the position scope and idempotency key, so
    /// a replayed submit always maps to the same order.
    #[must_use]
    pub fn derive(key: &PositionKey, idempotency_key: &str) -> Self {
        let name = format!("{key}#{idempotency_key}");
        Self(Uuid::new_v5(&ORDER_NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(pub Uuid);

impl TradeId {
    /// One trade per order, so the trade id is a function of the order id.
    #[must_use]
    pub fn for_order(order_id: OrderId) -> Self {
        Self(Uuid::new_v5(&TRADE_NAMESPACE, order_id.0.as_bytes()))
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An order as persisted by submit. Execute moves it to a terminal status
/// exactly once; nothing else changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(flatten)]
    pub key: PositionKey,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price_policy: PricePolicy,
    /// Price used to estimate commission at submit time.
    pub reference_price: Decimal,
    pub commission_rate_snapshot: Decimal,
    pub commission_estimated: Decimal,
    pub idempotency_key: String,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Executed,
    Cancelled,
    Rejected,
}

/// Immutable record of one successful fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub order_id: OrderId,
    #[serde(flatten)]
    pub key: PositionKey,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub commission_rate_effective: Decimal,
    pub status: TradeStatus,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.qty * self.price
    }
}
