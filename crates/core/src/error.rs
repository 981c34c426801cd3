//! Error taxonomy shared by every engine component.
//!
//! A HOLD is a decision, not an error: nothing in here is raised for
//! "no action taken". Below-minimum fills are likewise reported as fill
//! outcomes rather than errors.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the domain services and their ports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed input (negative quantity, unknown side, bad price).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A SELL asks for more shares than the position holds at execute time.
    #[error("guardrail breach: sell quantity {requested} exceeds holdings {held}")]
    GuardrailBreach { requested: Decimal, held: Decimal },

    /// Quote fetch failed or timed out.
    #[error("market data unavailable for {symbol}: {reason}")]
    MarketDataUnavailable { symbol: String, reason: String },

    /// Compare-and-swap on a versioned record lost a race.
    #[error("persistence conflict on {key}: expected version {expected}, found {found}")]
    PersistenceConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    /// Accrual and payment data disagree; needs manual review.
    #[error("dividend entitlement mismatch for {key} ({announcement_id}): {reason}")]
    DividendEntitlementMismatch {
        key: String,
        announcement_id: String,
        reason: String,
    },

    /// The position already submitted its daily allowance of orders.
    #[error("daily order cap of {cap} reached for {key}")]
    DailyOrderCapReached { key: String, cap: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or unsupported configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Backing store failure (I/O, serialization).
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceConflict { .. })
    }

    /// Stable machine-readable code, used as the `reason` of logged events.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::GuardrailBreach { .. } => "guardrail_breach",
            Self::MarketDataUnavailable { .. } => "market_data_unavailable",
            Self::PersistenceConflict { .. } => "persistence_conflict",
            Self::DividendEntitlementMismatch { .. } => "dividend_entitlement_mismatch",
            Self::DailyOrderCapReached { .. } => "daily_order_cap_reached",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "config_error",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict = EngineError::PersistenceConflict {
            key: "t/p/x".to_string(),
            expected: 1,
            found: 2,
        };
        assert!(conflict.is_retryable());

        let breach = EngineError::GuardrailBreach {
            requested: dec!(50),
            held: dec!(30),
        };
        assert!(!breach.is_retryable());
        assert_eq!(breach.code(), "guardrail_breach");
        assert_eq!(
            breach.to_string(),
            "guardrail breach: sell quantity 50 exceeds holdings 30"
        );
    }
}
