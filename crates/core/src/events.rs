use crate::error::EngineError;
use crate::guardrail::GuardrailDecision;
use crate::order::OrderId;
use crate::position::PositionKey;
use crate::trigger::TriggerDecision;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

const CORRELATION_NAMESPACE: Uuid = Uuid::from_u128(0x9a4f_0e37_c2d1_4b86_a5e3_7f10_62bc_d958);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    Pre,
    Regular,
    Post,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
    pub session: MarketSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Bar width, parsed from strings like `1m`, `15m`, `1h`, `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BarInterval {
    seconds: i64,
}

impl BarInterval {
    pub const MINUTE: Self = Self { seconds: 60 };
    pub const HOUR: Self = Self { seconds: 3_600 };
    pub const DAY: Self = Self { seconds: 86_400 };

    #[must_use]
    pub const fn seconds(self) -> i64 {
        self.seconds
    }

    #[must_use]
    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds)
    }

    /// Start of the bucket containing `ts`.
    #[must_use]
    pub fn bucket_start(self, ts: DateTime<Utc>) -> i64 {
        ts.timestamp().div_euclid(self.seconds) * self.seconds
    }
}

impl FromStr for BarInterval {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || EngineError::Validation(format!("invalid bar interval '{s}'"));
        let (split, _) = s.char_indices().last().ok_or_else(invalid)?;
        let (count, unit) = s.split_at(split);
        let count: i64 = count.parse().map_err(|_| invalid())?;
        let unit_seconds = match unit {
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            _ => return Err(invalid()),
        };
        if count <= 0 {
            return Err(invalid());
        }
        Ok(Self {
            seconds: count * unit_seconds,
        })
    }
}

impl TryFrom<String> for BarInterval {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BarInterval> for String {
    fn from(interval: BarInterval) -> Self {
        match interval.seconds {
            s if s % 86_400 == 0 => format!("{}d", s / 86_400),
            s if s % 3_600 == 0 => format!("{}h", s / 3_600),
            s => format!("{}m", s / 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// One per orchestrator tick, including HOLDs.
    Evaluation,
    OrderSubmitted,
    OrderFilled,
    FillRejectedBelowMin,
    FillSkippedBelowMin,
    GuardrailBreach,
    DividendAccrued,
    DividendPaid,
    DividendMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventAction {
    Hold,
    Buy,
    Sell,
    Skip,
    Reject,
    AccrueDividend,
    PayDividend,
    Review,
}

/// Append-only audit record. Field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub tenant_id: String,
    pub portfolio_id: String,
    pub position_id: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub trigger_decision: Option<TriggerDecision>,
    pub guardrail_decision: Option<GuardrailDecision>,
    pub action: EventAction,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
}

impl EngineEvent {
    #[must_use]
    pub fn new(
        key: &PositionKey,
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        correlation_id: Uuid,
        event_type: EventType,
        action: EventAction,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: key.tenant_id.clone(),
            portfolio_id: key.portfolio_id.clone(),
            position_id: key.position_id.clone(),
            symbol: symbol.into(),
            timestamp,
            correlation_id,
            event_type,
            trigger_decision: None,
            guardrail_decision: None,
            action,
            reason: reason.into(),
            order_id: None,
        }
    }

    #[must_use]
    pub fn with_trigger(mut self, decision: TriggerDecision) -> Self {
        self.trigger_decision = Some(decision);
        self
    }

    #[must_use]
    pub fn with_guardrail(mut self, decision: GuardrailDecision) -> Self {
        self.guardrail_decision = Some(decision);
        self
    }

    #[must_use]
    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    #[must_use]
    pub fn position_key(&self) -> PositionKey {
        PositionKey::new(&self.tenant_id, &self.portfolio_id, &self.position_id)
    }
}

/// Correlation id for a tick: a function of position and evaluation time,
/// so a replayed series produces the same ids.
#[must_use]
pub fn correlation_id(key: &PositionKey, at: DateTime<Utc>) -> Uuid {
    let name = format!("{key}@{}", at.timestamp_nanos_opt().unwrap_or_else(|| at.timestamp()));
    Uuid::new_v5(&CORRELATION_NAMESPACE, name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_interval_parsing() {
        assert_eq!("1m".parse::<BarInterval>().unwrap(), BarInterval::MINUTE);
        assert_eq!("1h".parse::<BarInterval>().unwrap(), BarInterval::HOUR);
        assert_eq!("1d".parse::<BarInterval>().unwrap(), BarInterval::DAY);
        assert_eq!("15m".parse::<BarInterval>().unwrap().seconds(), 900);
        assert!("0m".parse::<BarInterval>().is_err());
        assert!("1w".parse::<BarInterval>().is_err());
        assert!("".parse::<BarInterval>().is_err());
        assert_eq!(String::from("4h".parse::<BarInterval>().unwrap()), "4h");
    }

    #[test]
    fn test_bucket_start() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 47, 12).unwrap();
        let hour = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(BarInterval::HOUR.bucket_start(ts), hour.timestamp());
    }

    #[test]
    fn test_event_wire_fields() {
        let key = PositionKey::new("t1", "p1", "pos1");
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let event = EngineEvent::new(
            &key,
            "AAPL",
            ts,
            correlation_id(&key, ts),
            EventType::Evaluation,
            EventAction::Hold,
            "no_trigger",
        );
        let json = serde_json::to_value(&event).unwrap();
        for field in [
            "tenant_id",
            "portfolio_id",
            "position_id",
            "symbol",
            "timestamp",
            "correlation_id",
            "type",
            "trigger_decision",
            "guardrail_decision",
            "action",
            "reason",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["type"], "evaluation");
        assert_eq!(json["action"], "HOLD");
        assert_eq!(event.position_key(), key);
    }

    #[test]
    fn test_correlation_id_is_deterministic() {
        let key = PositionKey::new("t", "p", "x");
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(correlation_id(&key, ts), correlation_id(&key, ts));
        assert_ne!(
            correlation_id(&key, ts),
            correlation_id(&key, ts + Duration::minutes(1))
        );
    }
}
