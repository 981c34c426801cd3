//! Order sizing strategies.
//!
//! A closed set of variants selected by a per-position key. Each variant is a
//! pure function over [`SizingContext`]; the result is a signed raw quantity
//! whose magnitude is then applied against the side.

use crate::error::EngineError;
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingStrategy {
    /// `(anchor / price - 1) * ratio * (total_value / price)`.
    #[default]
    Proportional,
    /// BUY spends `cash * ratio`; SELL gives up `shares * ratio`.
    FixedPercentage,
    /// `(anchor / price) * ratio * (total_value / price)`, without the zeroing term.
    Original,
}

type SizingFn = fn(&SizingContext) -> Decimal;

impl SizingStrategy {
    pub const ALL: [Self; 3] = [Self::Proportional, Self::FixedPercentage, Self::Original];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Proportional => "proportional",
            Self::FixedPercentage => "fixed_percentage",
            Self::Original => "original",
        }
    }

    const fn function(self) -> SizingFn {
        match self {
            Self::Proportional => proportional,
            Self::FixedPercentage => fixed_percentage,
            Self::Original => original,
        }
    }

    /// Signed raw quantity for `ctx`. Zero when the price is not positive.
    #[must_use]
    pub fn raw_quantity(self, ctx: &SizingContext) -> Decimal {
        if ctx.price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.function())(ctx)
    }

    /// Unsigned quantity to trade on `ctx.side`.
    #[must_use]
    pub fn desired_quantity(self, ctx: &SizingContext) -> Decimal {
        self.raw_quantity(ctx).abs()
    }
}

impl fmt::Display for SizingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SizingStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.key() == s.trim())
            .ok_or_else(|| EngineError::Config(format!("unknown sizing strategy '{s}'")))
    }
}

/// Everything a sizing strategy is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingContext {
    pub price: Decimal,
    pub anchor: Decimal,
    pub cash: Decimal,
    pub shares: Decimal,
    pub rebalance_ratio: Decimal,
    pub threshold: Decimal,
    pub side: Side,
}

impl SizingContext {
    fn total_value(&self) -> Decimal {
        self.cash + self.shares * self.price
    }
}

fn proportional(ctx: &SizingContext) -> Decimal {
    (ctx.anchor / ctx.price - Decimal::ONE) * ctx.rebalance_ratio * (ctx.total_value() / ctx.price)
}

fn fixed_percentage(ctx: &SizingContext) -> Decimal {
    match ctx.side {
        Side::Buy => ctx.cash * ctx.rebalance_ratio / ctx.price,
        Side::Sell => -(ctx.shares * ctx.rebalance_ratio),
    }
}

fn original(ctx: &SizingContext) -> Decimal {
    (ctx.anchor / ctx.price) * ctx.rebalance_ratio * (ctx.total_value() / ctx.price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx(price: Decimal, side: Side) -> SizingContext {
        SizingContext {
            price,
            anchor: dec!(100),
            cash: dec!(5000),
            shares: dec!(50),
            rebalance_ratio: dec!(0.5),
            threshold: dec!(0.03),
            side,
        }
    }

    #[test]
    fn test_proportional_zero_at_anchor() {
        assert_eq!(
            SizingStrategy::Proportional.raw_quantity(&ctx(dec!(100), Side::Buy)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_proportional_buys_on_drop_sells_on_rise() {
        // price 80: (100/80 - 1) * 0.5 * (5000 + 4000) / 80 = 0.25 * 0.5 * 112.5
        let buy = SizingStrategy::Proportional.raw_quantity(&ctx(dec!(80), Side::Buy));
        assert_eq!(buy, dec!(14.0625));

        // price 125: (0.8 - 1) * 0.5 * (5000 + 6250) / 125 = -0.2 * 0.5 * 90
        let sell = SizingStrategy::Proportional.raw_quantity(&ctx(dec!(125), Side::Sell));
        assert_eq!(sell, dec!(-9));
        assert_eq!(SizingStrategy::Proportional.desired_quantity(&ctx(dec!(125), Side::Sell)), dec!(9));
    }

    #[test]
    fn test_fixed_percentage() {
        assert_eq!(
            SizingStrategy::FixedPercentage.raw_quantity(&ctx(dec!(80), Side::Buy)),
            dec!(31.25)
        );
        assert_eq!(
            SizingStrategy::FixedPercentage.raw_quantity(&ctx(dec!(125), Side::Sell)),
            dec!(-25)
        );
    }

    #[test]
    fn test_original_is_more_aggressive() {
        let c = ctx(dec!(80), Side::Buy);
        let original = SizingStrategy::Original.raw_quantity(&c);
        let proportional = SizingStrategy::Proportional.raw_quantity(&c);
        // 1.25 * 0.5 * 112.5
        assert_eq!(original, dec!(70.3125));
        assert!(original > proportional);
    }

    #[test]
    fn test_non_positive_price_sizes_nothing() {
        for strategy in SizingStrategy::ALL {
            assert_eq!(strategy.raw_quantity(&ctx(Decimal::ZERO, Side::Buy)), Decimal::ZERO);
        }
    }

    #[test]
    fn test_lookup_by_key() {
        for strategy in SizingStrategy::ALL {
            assert_eq!(strategy.key().parse::<SizingStrategy>().unwrap(), strategy);
        }
        assert!("kelly".parse::<SizingStrategy>().is_err());
    }
}
