//! Trigger evaluation: how far has the price moved away from the anchor?
//!
//! Pure and deterministic. Both the live loop and the replay runner call
//! [`evaluate_trigger`] with the same inputs and must get the same answer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Distance from the anchor (as fractions, `0.03` = 3%) that fires a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Rise that fires UP (a SELL candidate).
    pub up_threshold: Decimal,
    /// Fall that fires DOWN (a BUY candidate).
    pub down_threshold: Decimal,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            up_threshold: Decimal::new(3, 2),
            down_threshold: Decimal::new(3, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerDirection {
    None,
    /// Price rose past the up threshold.
    Up,
    /// Price fell past the down threshold.
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDecision {
    pub direction: TriggerDirection,
    /// Signed `(price - anchor) / anchor`; zero when there is no anchor.
    pub pct_change: Decimal,
    pub price: Decimal,
    pub anchor: Option<Decimal>,
}

impl TriggerDecision {
    #[must_use]
    pub fn fired(&self) -> bool {
        self.direction != TriggerDirection::None
    }
}

/// Compares `price` against `anchor`.
///
/// A missing or zero anchor always yields [`TriggerDirection::None`].
/// Both thresholds are inclusive.
#[must_use]
pub fn evaluate_trigger(price: Decimal, anchor: Option<Decimal>, config: &TriggerConfig) -> TriggerDecision {
    let Some(anchor_price) = anchor.filter(|a| !a.is_zero()) else {
        return TriggerDecision {
            direction: TriggerDirection::None,
            pct_change: Decimal::ZERO,
            price,
            anchor,
        };
    };

    let pct_change = (price - anchor_price) / anchor_price;
    let direction = if pct_change >= config.up_threshold {
        TriggerDirection::Up
    } else if pct_change <= -config.down_threshold {
        TriggerDirection::Down
    } else {
        TriggerDirection::None
    };

    TriggerDecision {
        direction,
        pct_change,
        price,
        anchor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> TriggerConfig {
        TriggerConfig {
            up_threshold: dec!(0.03),
            down_threshold: dec!(0.03),
        }
    }

    #[test]
    fn test_price_rise_fires_up() {
        // 150 -> 156 is +4%
        let decision = evaluate_trigger(dec!(156.00), Some(dec!(150.00)), &config());
        assert_eq!(decision.direction, TriggerDirection::Up);
        assert_eq!(decision.pct_change, dec!(0.04));
    }

    #[test]
    fn test_price_drop_fires_down() {
        let decision = evaluate_trigger(dec!(95), Some(dec!(100)), &config());
        assert_eq!(decision.direction, TriggerDirection::Down);
        assert_eq!(decision.pct_change, dec!(-0.05));
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        assert_eq!(
            evaluate_trigger(dec!(103), Some(dec!(100)), &config()).direction,
            TriggerDirection::Up
        );
        assert_eq!(
            evaluate_trigger(dec!(97), Some(dec!(100)), &config()).direction,
            TriggerDirection::Down
        );
    }

    #[test]
    fn test_inside_band_is_none() {
        for price in [dec!(97.01), dec!(99), dec!(100), dec!(101.5), dec!(102.99)] {
            let decision = evaluate_trigger(price, Some(dec!(100)), &config());
            assert_eq!(decision.direction, TriggerDirection::None, "price {price}");
        }
    }

    #[test]
    fn test_asymmetric_thresholds() {
        let config = TriggerConfig {
            up_threshold: dec!(0.10),
            down_threshold: dec!(0.02),
        };
        assert_eq!(
            evaluate_trigger(dec!(105), Some(dec!(100)), &config).direction,
            TriggerDirection::None
        );
        assert_eq!(
            evaluate_trigger(dec!(98), Some(dec!(100)), &config).direction,
            TriggerDirection::Down
        );
    }

    #[test]
    fn test_missing_or_zero_anchor_never_fires() {
        let missing = evaluate_trigger(dec!(500), None, &config());
        assert_eq!(missing.direction, TriggerDirection::None);
        assert_eq!(missing.pct_change, Decimal::ZERO);

        let zero = evaluate_trigger(dec!(500), Some(Decimal::ZERO), &config());
        assert_eq!(zero.direction, TriggerDirection::None);
        assert!(!zero.fired());
    }
}
