//! Adapters that let the shared tick engine run against history: a clock the
//! runner moves bar by bar, and quotes taken from the current bar's close.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use volbal_core::{Bar, Clock, EngineError, MarketDataProvider, MarketSession, Quote};

#[derive(Debug)]
pub struct ReplayClock {
    now: RwLock<DateTime<Utc>>,
}

impl ReplayClock {
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }
}

impl Clock for ReplayClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .read()
            .map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
    }
}

/// Quotes the close of the most recent bar seen per symbol.
#[derive(Debug, Default)]
pub struct ReplayQuoteProvider {
    bars: RwLock<HashMap<String, Bar>>,
}

impl ReplayQuoteProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, bar: &Bar) {
        if let Ok(mut bars) = self.bars.write() {
            bars.insert(bar.symbol.clone(), bar.clone());
        }
    }
}

#[async_trait]
impl MarketDataProvider for ReplayQuoteProvider {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, EngineError> {
        let bar = self
            .bars
            .read()
            .map_err(|_| EngineError::Storage("replay quotes poisoned".to_string()))?
            .get(symbol)
            .cloned()
            .ok_or_else(|| EngineError::MarketDataUnavailable {
                symbol: symbol.to_string(),
                reason: "no bar replayed yet".to_string(),
            })?;
        Ok(Quote {
            symbol: bar.symbol,
            price: bar.close,
            bid: bar.close,
            ask: bar.close,
            timestamp: bar.timestamp,
            session: MarketSession::Regular,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_quotes_follow_the_replayed_bar() {
        let quotes = ReplayQuoteProvider::new();
        assert!(matches!(
            quotes.get_quote("AAPL").await,
            Err(EngineError::MarketDataUnavailable { .. })
        ));

        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        quotes.advance(&Bar {
            symbol: "AAPL".to_string(),
            open: dec!(185),
            high: dec!(188),
            low: dec!(183),
            close: dec!(185.64),
            volume: dec!(82488700),
            timestamp: ts,
        });

        let quote = quotes.get_quote("AAPL").await.unwrap();
        assert_eq!(quote.price, dec!(185.64));
        assert_eq!(quote.timestamp, ts);
    }

    #[test]
    fn test_clock_moves_when_set() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let clock = ReplayClock::new(start);
        assert_eq!(clock.now(), start);

        let later = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
