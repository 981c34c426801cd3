//! Shared fixtures: a settable clock, a scripted quote provider and ports
//! that can be made to fail.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use volbal_core::{
    AppConfig, Clock, ConfigStore, EngineConfig, EngineError, EngineEvent, EventLogger, MarketDataProvider,
    MarketSession, Position, PositionKey, PositionSettings, Quote,
};
use volbal_execution::{InMemoryEventLog, InMemoryLedger, PositionLocks, RetryPolicy, StaticConfigStore};
use volbal_orchestrator::{EnginePorts, TickEngine};

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
}

pub fn key(position_id: &str) -> PositionKey {
    PositionKey::new("acme", "core", position_id)
}

#[derive(Debug)]
pub struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Debug, Clone)]
enum Script {
    Price(Decimal),
    Fail(String),
    Stall(Duration),
}

/// Quotes per symbol, set by the test.
#[derive(Debug, Default)]
pub struct ScriptedMarket {
    scripts: Mutex<HashMap<String, Script>>,
}

impl ScriptedMarket {
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.scripts.lock().unwrap().insert(symbol.to_string(), Script::Price(price));
    }

    pub fn fail(&self, symbol: &str, reason: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Script::Fail(reason.to_string()));
    }

    pub fn stall(&self, symbol: &str, delay: Duration) {
        self.scripts.lock().unwrap().insert(symbol.to_string(), Script::Stall(delay));
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedMarket {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, EngineError> {
        let script = self.scripts.lock().unwrap().get(symbol).cloned();
        let price = match script {
            Some(Script::Price(price)) => price,
            Some(Script::Fail(reason)) => return Err(EngineError::Storage(reason)),
            Some(Script::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                return Err(EngineError::Storage("stalled".to_string()));
            }
            None => {
                return Err(EngineError::MarketDataUnavailable {
                    symbol: symbol.to_string(),
                    reason: "no quote".to_string(),
                })
            }
        };
        Ok(Quote {
            symbol: symbol.to_string(),
            price,
            bid: price,
            ask: price,
            timestamp: at(15, 0),
            session: MarketSession::Regular,
        })
    }
}

/// Journal that refuses every append while down.
#[derive(Debug, Default)]
pub struct OutageJournal {
    down: AtomicBool,
    pub accepted: InMemoryEventLog,
}

impl OutageJournal {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventLogger for OutageJournal {
    async fn append(&self, event: EngineEvent) -> Result<(), EngineError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(EngineError::Storage("disk full".to_string()));
        }
        self.accepted.append(event).await
    }
}

/// Config backend that cannot be reached.
#[derive(Debug, Default)]
pub struct UnreachableConfig;

#[async_trait]
impl ConfigStore for UnreachableConfig {
    async fn commission_rate(&self, _tenant_id: &str, _asset: &str) -> Result<Decimal, EngineError> {
        Err(unreachable_config())
    }

    async fn position_settings(&self, _key: &PositionKey) -> Result<PositionSettings, EngineError> {
        Err(unreachable_config())
    }

    async fn engine_config(&self) -> Result<EngineConfig, EngineError> {
        Err(unreachable_config())
    }
}

fn unreachable_config() -> EngineError {
    EngineError::Config("settings backend unreachable".to_string())
}

pub fn engine(
    ledger: Arc<InMemoryLedger>,
    events: Arc<dyn EventLogger>,
    config: Arc<dyn ConfigStore>,
    market: Arc<ScriptedMarket>,
    clock: Arc<TestClock>,
) -> TickEngine {
    TickEngine::new(
        EnginePorts {
            ledger,
            events,
            config,
            market,
            clock,
        },
        PositionLocks::new(),
        RetryPolicy::none(),
    )
    .with_quote_timeout(Duration::from_secs(1))
}

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub events: Arc<InMemoryEventLog>,
    pub config: Arc<StaticConfigStore>,
    pub market: Arc<ScriptedMarket>,
    pub clock: Arc<TestClock>,
    pub engine: Arc<TickEngine>,
}

pub fn harness(config: AppConfig, positions: Vec<Position>) -> Harness {
    let ledger = Arc::new(InMemoryLedger::with_positions(positions));
    let events = Arc::new(InMemoryEventLog::new());
    let config = Arc::new(StaticConfigStore::new(config));
    let market = Arc::new(ScriptedMarket::default());
    let clock = Arc::new(TestClock::new(at(15, 0)));
    let engine = engine(ledger.clone(), events.clone(), config.clone(), market.clone(), clock.clone());
    Harness {
        ledger,
        events,
        config,
        market,
        clock,
        engine: Arc::new(engine),
    }
}
