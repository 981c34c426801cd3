//! Quantity normalization and below-minimum handling for fills.

use crate::error::EngineError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on step/lot alternation; the loop reaches a fixed point long before.
const MAX_NORMALIZE_PASSES: usize = 64;

/// What to do when a normalized fill falls below the order minimums.
///
/// `clip` is reserved and has no defined behaviour, so it is refused when
/// the policy is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BelowMinAction {
    /// Skip the fill, leave the position untouched.
    #[default]
    Hold,
    /// Reject the order.
    Reject,
}

impl TryFrom<String> for BelowMinAction {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hold" => Ok(Self::Hold),
            "reject" => Ok(Self::Reject),
            "clip" => Err(EngineError::Config(
                "action_below_min 'clip' is reserved and not implemented".to_string(),
            )),
            other => Err(EngineError::Config(format!(
                "unknown action_below_min '{other}'"
            ))),
        }
    }
}

impl From<BelowMinAction> for String {
    fn from(action: BelowMinAction) -> Self {
        action.to_string()
    }
}

impl fmt::Display for BelowMinAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hold => f.write_str("hold"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderPolicy {
    pub min_qty: Decimal,
    pub min_notional: Decimal,
    /// Zero ignores lot clamping.
    pub lot_size: Decimal,
    /// Zero ignores step rounding.
    pub qty_step: Decimal,
    pub action_below_min: BelowMinAction,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            min_qty: Decimal::ZERO,
            min_notional: Decimal::ZERO,
            lot_size: Decimal::ZERO,
            qty_step: Decimal::ZERO,
            action_below_min: BelowMinAction::Hold,
        }
    }
}

/// Result of checking a normalized quantity against the minimums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PolicyCheck {
    Accepted { qty: Decimal },
    BelowMinimum { qty: Decimal, notional: Decimal, action: BelowMinAction },
}

impl OrderPolicy {
    /// Rounds down to `qty_step`, then clamps down to a multiple of `lot_size`.
    ///
    /// Repeats until nothing changes, so the result is a fixed point and
    /// normalizing twice equals normalizing once.
    #[must_use]
    pub fn normalize(&self, qty: Decimal) -> Decimal {
        if qty <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let mut current = qty;
        for _ in 0..MAX_NORMALIZE_PASSES {
            let next = floor_to(floor_to(current, self.qty_step), self.lot_size);
            if next == current {
                return current.normalize();
            }
            current = next;
        }
        Decimal::ZERO
    }

    /// Normalizes `qty` and checks it against `min_qty` and `min_notional`.
    /// A quantity that normalizes to zero is always below minimum.
    #[must_use]
    pub fn check(&self, qty: Decimal, price: Decimal) -> PolicyCheck {
        let normalized = self.normalize(qty);
        let notional = normalized * price;
        if normalized <= Decimal::ZERO || normalized < self.min_qty || notional < self.min_notional {
            PolicyCheck::BelowMinimum {
                qty: normalized,
                notional,
                action: self.action_below_min,
            }
        } else {
            PolicyCheck::Accepted { qty: normalized }
        }
    }
}

fn floor_to(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }
    (value / increment).floor() * increment
}
