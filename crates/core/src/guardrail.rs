//! Allocation guardrails.
//!
//! [`evaluate_guardrail`] runs at evaluation time and may trim a proposed
//! quantity to stay inside the configured allocation band and trade-size cap.
//! [`recheck_fill`] runs again inside the fill pipeline against the position
//! as it is at execute time.

use crate::error::EngineError;
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Allocation bounds as fractions of total position value (stock + cash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub min_stock_allocation: Decimal,
    pub max_stock_allocation: Decimal,
    /// Max notional of a single trade as a fraction of total value. Zero disables the cap.
    pub max_trade_pct: Decimal,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            min_stock_allocation: Decimal::new(25, 2),
            max_stock_allocation: Decimal::new(75, 2),
            max_trade_pct: Decimal::new(10, 2),
        }
    }
}

/// Position snapshot plus the proposed trade. `price` must be the same
/// snapshot used for sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardrailInput {
    pub quantity: Decimal,
    pub cash: Decimal,
    pub price: Decimal,
    pub side: Side,
    pub requested_qty: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailReason {
    WithinBounds,
    TrimmedToMaxAllocation,
    TrimmedToMinAllocation,
    TrimmedToMaxTradeSize,
    TrimmedToCash,
    AtMaxAllocation,
    AtMinAllocation,
    InsufficientCash,
    SellExceedsHoldings,
    ZeroQuantity,
    EmptyPosition,
    InvalidPrice,
}

impl GuardrailReason {
    /// Snake-case code, matching the serialized form.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::WithinBounds => "within_bounds",
            Self::TrimmedToMaxAllocation => "trimmed_to_max_allocation",
            Self::TrimmedToMinAllocation => "trimmed_to_min_allocation",
            Self::TrimmedToMaxTradeSize => "trimmed_to_max_trade_size",
            Self::TrimmedToCash => "trimmed_to_cash",
            Self::AtMaxAllocation => "at_max_allocation",
            Self::AtMinAllocation => "at_min_allocation",
            Self::InsufficientCash => "insufficient_cash",
            Self::SellExceedsHoldings => "sell_exceeds_holdings",
            Self::ZeroQuantity => "zero_quantity",
            Self::EmptyPosition => "empty_position",
            Self::InvalidPrice => "invalid_price",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailDecision {
    pub allowed: bool,
    /// Quantity after trimming; zero when not allowed.
    pub qty: Decimal,
    pub requested_qty: Decimal,
    pub reason: GuardrailReason,
    /// Hard breach (selling more than held); never trimmed.
    pub breach: bool,
    pub pre_trade_allocation: Decimal,
    pub post_trade_allocation: Decimal,
}

impl GuardrailDecision {
    #[must_use]
    pub fn trimmed(&self) -> bool {
        self.allowed && self.qty < self.requested_qty
    }

    fn blocked(input: &GuardrailInput, reason: GuardrailReason, allocation: Decimal) -> Self {
        Self {
            allowed: false,
            qty: Decimal::ZERO,
            requested_qty: input.requested_qty,
            reason,
            breach: reason == GuardrailReason::SellExceedsHoldings,
            pre_trade_allocation: allocation,
            post_trade_allocation: allocation,
        }
    }
}

/// Checks a proposed trade against the allocation band and trade-size cap.
#[must_use]
pub fn evaluate_guardrail(input: &GuardrailInput, config: &GuardrailConfig) -> GuardrailDecision {
    if input.price <= Decimal::ZERO {
        return GuardrailDecision::blocked(input, GuardrailReason::InvalidPrice, Decimal::ZERO);
    }

    let stock_value = input.quantity * input.price;
    let total_value = stock_value + input.cash;
    if total_value <= Decimal::ZERO {
        return GuardrailDecision::blocked(input, GuardrailReason::EmptyPosition, Decimal::ZERO);
    }
    let allocation = stock_value / total_value;

    if input.requested_qty <= Decimal::ZERO {
        return GuardrailDecision::blocked(input, GuardrailReason::ZeroQuantity, allocation);
    }
    if input.side == Side::Sell && input.requested_qty > input.quantity {
        return GuardrailDecision::blocked(input, GuardrailReason::SellExceedsHoldings, allocation);
    }

    let mut qty = input.requested_qty;
    let mut reason = GuardrailReason::WithinBounds;

    match input.side {
        Side::Buy => {
            let room = (config.max_stock_allocation * total_value - stock_value) / input.price;
            if room <= Decimal::ZERO {
                return GuardrailDecision::blocked(input, GuardrailReason::AtMaxAllocation, allocation);
            }
            if qty > room {
                qty = room;
                reason = GuardrailReason::TrimmedToMaxAllocation;
            }

            let affordable = input.cash / input.price;
            if affordable <= Decimal::ZERO {
                return GuardrailDecision::blocked(input, GuardrailReason::InsufficientCash, allocation);
            }
            if qty > affordable {
                qty = affordable;
                reason = GuardrailReason::TrimmedToCash;
            }
        }
        Side::Sell => {
            let room = (stock_value - config.min_stock_allocation * total_value) / input.price;
            if room <= Decimal::ZERO {
                return GuardrailDecision::blocked(input, GuardrailReason::AtMinAllocation, allocation);
            }
            if qty > room {
                qty = room;
                reason = GuardrailReason::TrimmedToMinAllocation;
            }
        }
    }

    if config.max_trade_pct > Decimal::ZERO {
        let cap = config.max_trade_pct * total_value / input.price;
        if qty > cap {
            qty = cap;
            reason = GuardrailReason::TrimmedToMaxTradeSize;
        }
    }

    let post_quantity = match input.side {
        Side::Buy => input.quantity + qty,
        Side::Sell => input.quantity - qty,
    };

    GuardrailDecision {
        allowed: true,
        qty,
        requested_qty: input.requested_qty,
        reason,
        breach: false,
        pre_trade_allocation: allocation,
        post_trade_allocation: post_quantity * input.price / total_value,
    }
}

/// Execute-time re-check: a SELL can never take more than is held right now.
///
/// # Errors
///
/// Returns [`EngineError::GuardrailBreach`] when `qty` exceeds `held` on a SELL.
pub fn recheck_fill(side: Side, qty: Decimal, held: Decimal) -> Result<(), EngineError> {
    if side == Side::Sell && qty > held {
        return Err(EngineError::GuardrailBreach {
            requested: qty,
            held,
        });
    }
    Ok(())
}
