//! Ports between the domain services and the outside world.
//!
//! The live and simulated orchestrators differ only in which implementations
//! of these traits they are handed.

use crate::config::{EngineConfig, PositionSettings};
use crate::dividend::{DividendAccrual, DividendAnnouncement};
use crate::error::EngineError;
use crate::events::{Bar, BarInterval, EngineEvent, Quote};
use crate::guardrail::GuardrailConfig;
use crate::order::{Order, OrderId, OrderStatus, Trade};
use crate::order_policy::OrderPolicy;
use crate::position::{Position, PositionKey};
use crate::trigger::TriggerConfig;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, EngineError>;
}

#[async_trait]
pub trait HistoricalDataProvider: Send + Sync {
    /// Bars for `symbol` within `[start, end]`, oldest first. Calling it again
    /// with the same arguments returns the same sequence.
    async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, EngineError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn get(&self, key: &PositionKey) -> Result<Option<Position>, EngineError>;

    /// Compare-and-swap on `position.version`. A record that does not exist
    /// yet is created when `version` is zero. Returns the stored copy with its
    /// version bumped.
    async fn save(&self, position: &Position) -> Result<Position, EngineError>;

    async fn list(&self) -> Result<Vec<Position>, EngineError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_idempotency_key(
        &self,
        key: &PositionKey,
        idempotency_key: &str,
    ) -> Result<Option<Order>, EngineError>;

    /// Inserts a new order and queues `event` with it. If an order with the
    /// same idempotency key already exists for the position, that order is
    /// returned instead and nothing is queued.
    async fn insert_order(&self, order: Order, event: EngineEvent) -> Result<Order, EngineError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, EngineError>;

    /// Moves a `submitted` order to a terminal status and queues `event`.
    async fn set_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        event: EngineEvent,
    ) -> Result<Order, EngineError>;

    /// Orders submitted for `key` on the given UTC date.
    async fn count_orders_on(&self, key: &PositionKey, date: NaiveDate) -> Result<u32, EngineError>;

    async fn trade_for_order(&self, id: OrderId) -> Result<Option<Trade>, EngineError>;

    async fn trades(&self, key: &PositionKey) -> Result<Vec<Trade>, EngineError>;

    /// Applies a fill in one step: saves `position` (compare-and-swap), moves
    /// the order to `filled`, stores `trade` and queues `event`. Either all
    /// of it happens or none does.
    async fn commit_fill(
        &self,
        position: &Position,
        trade: Trade,
        event: EngineEvent,
    ) -> Result<(Position, Order), EngineError>;
}

#[async_trait]
pub trait DividendRepository: Send + Sync {
    /// Stores an announcement, or returns the stored one if the id is known.
    async fn upsert_announcement(
        &self,
        announcement: DividendAnnouncement,
    ) -> Result<DividendAnnouncement, EngineError>;

    async fn get_announcement(&self, id: &str) -> Result<Option<DividendAnnouncement>, EngineError>;

    async fn announcements(&self) -> Result<Vec<DividendAnnouncement>, EngineError>;

    async fn get_accrual(
        &self,
        key: &PositionKey,
        announcement_id: &str,
    ) -> Result<Option<DividendAccrual>, EngineError>;

    async fn accruals(&self) -> Result<Vec<DividendAccrual>, EngineError>;

    /// Saves `position` (compare-and-swap), records `accrual` and queues
    /// `event` together. Fails with a conflict if the accrual already exists.
    async fn commit_accrual(
        &self,
        position: &Position,
        accrual: DividendAccrual,
        event: EngineEvent,
    ) -> Result<(Position, DividendAccrual), EngineError>;

    /// Saves `position` (compare-and-swap), replaces the stored accrual,
    /// which must still be `accrued`, and queues `event`.
    async fn commit_payment(
        &self,
        position: &Position,
        accrual: DividendAccrual,
        event: EngineEvent,
    ) -> Result<(Position, DividendAccrual), EngineError>;

    async fn flag_accrual(
        &self,
        key: &PositionKey,
        announcement_id: &str,
        reason: String,
        event: EngineEvent,
    ) -> Result<DividendAccrual, EngineError>;
}

/// Events written alongside ledger changes and handed to an [`EventLogger`]
/// afterwards.
///
/// A state change and its event are committed together, so a journal that is
/// down never leaves a fill without its audit record: the event waits here
/// until [`EventOutbox::publish_pending`] delivers it.
#[async_trait]
pub trait EventOutbox: Send + Sync {
    /// Queues an event that has no state change of its own.
    async fn enqueue(&self, event: EngineEvent) -> Result<(), EngineError>;

    /// Appends queued events to `sink` oldest first, dropping each one only
    /// after the sink accepted it. Stops at the first failure and leaves the
    /// rest queued. Returns how many were delivered.
    async fn publish_pending(&self, sink: &dyn EventLogger) -> Result<usize, EngineError>;

    async fn pending_events(&self) -> Result<Vec<EngineEvent>, EngineError>;
}

/// Everything the services persist, behind one handle.
pub trait Ledger: PositionRepository + OrderRepository + DividendRepository + EventOutbox {}

impl<T> Ledger for T where T: PositionRepository + OrderRepository + DividendRepository + EventOutbox + ?Sized {}

/// Append-only audit trail.
#[async_trait]
pub trait EventLogger: Send + Sync {
    async fn append(&self, event: EngineEvent) -> Result<(), EngineError>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Commission rate for `tenant_id` trading `asset`, most specific scope first.
    async fn commission_rate(&self, tenant_id: &str, asset: &str) -> Result<Decimal, EngineError>;

    async fn position_settings(&self, key: &PositionKey) -> Result<PositionSettings, EngineError>;

    async fn engine_config(&self) -> Result<EngineConfig, EngineError>;

    async fn trigger_config(&self, key: &PositionKey) -> Result<TriggerConfig, EngineError> {
        Ok(self.position_settings(key).await?.trigger)
    }

    async fn guardrail_config(&self, key: &PositionKey) -> Result<GuardrailConfig, EngineError> {
        Ok(self.position_settings(key).await?.guardrail)
    }

    async fn order_policy(&self, key: &PositionKey) -> Result<OrderPolicy, EngineError> {
        Ok(self.position_settings(key).await?.order_policy)
    }
}
