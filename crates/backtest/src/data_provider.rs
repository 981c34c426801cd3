use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use volbal_core::{Bar, BarInterval, EngineError, HistoricalDataProvider};

/// A fixed set of historical bars, served repeatedly for replay.
#[derive(Debug, Clone, Default)]
pub struct HistoricalBars {
    bars: Vec<Bar>,
}

impl HistoricalBars {
    /// Wraps bars already in memory; they are sorted by timestamp.
    #[must_use]
    pub fn from_bars(mut bars: Vec<Bar>) -> Self {
        bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.symbol.cmp(&b.symbol)));
        Self { bars }
    }

    /// Loads bars from a CSV file with a header row and the columns
    /// `timestamp,symbol,open,high,low,close,volume` (RFC 3339 timestamps).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The CSV file cannot be opened
    /// - A row has fewer than seven columns
    /// - Timestamp parsing fails
    /// - Decimal parsing fails for OHLCV values
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open bar file {}", path.display()))?;
        let mut bars = Vec::new();

        for (row, result) in reader.records().enumerate() {
            let record = result?;
            let line = row + 2;
            if record.len() < 7 {
                anyhow::bail!("row {line}: expected 7 columns, found {}", record.len());
            }
            let decimal = |i: usize| {
                Decimal::from_str(record[i].trim())
                    .with_context(|| format!("row {line}: invalid number '{}'", &record[i]))
            };
            let timestamp: DateTime<Utc> = record[0]
                .trim()
                .parse()
                .with_context(|| format!("row {line}: invalid timestamp '{}'", &record[0]))?;

            bars.push(Bar {
                symbol: record[1].trim().to_string(),
                open: decimal(2)?,
                high: decimal(3)?,
                low: decimal(4)?,
                close: decimal(5)?,
                volume: decimal(6)?,
                timestamp,
            });
        }

        Ok(Self::from_bars(bars))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Distinct symbols, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.bars.iter().map(|b| b.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Earliest and latest timestamps, if any bars are loaded.
    #[must_use]
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.bars.first()?.timestamp, self.bars.last()?.timestamp))
    }
}

#[async_trait]
impl HistoricalDataProvider for HistoricalBars {
    async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, EngineError> {
        if start > end {
            return Err(EngineError::Validation(format!("start {start} is after end {end}")));
        }
        let selected = self
            .bars
            .iter()
            .filter(|b| b.symbol == symbol && b.timestamp >= start && b.timestamp <= end);
        Ok(resample(selected, interval))
    }
}

/// Groups bars into `interval` buckets: first open, highest high, lowest low,
/// last close, summed volume, stamped with the last bar's timestamp. Bars
/// already at least `interval` apart pass through unchanged.
fn resample<'a>(bars: impl Iterator<Item = &'a Bar>, interval: BarInterval) -> Vec<Bar> {
    let mut buckets: BTreeMap<i64, Bar> = BTreeMap::new();
    for bar in bars {
        buckets
            .entry(interval.bucket_start(bar.timestamp))
            .and_modify(|agg| {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
                agg.timestamp = bar.timestamp;
            })
            .or_insert_with(|| bar.clone());
    }
    buckets.into_values().collect()
}
