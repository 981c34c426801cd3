//! In-process adapters for the core ports.
//!
//! The live binary can run on these directly; every simulation run builds a
//! fresh set so replays never share state with each other or with live books.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use volbal_core::{
    AccrualStatus, AppConfig, ConfigStore, DividendAccrual, DividendAnnouncement, DividendRepository,
    EngineConfig, EngineError, EngineEvent, EventLogger, EventOutbox, EventType, Order, OrderId, OrderRepository,
    OrderStatus, Position, PositionKey, PositionRepository, PositionSettings, Trade,
};

#[derive(Debug, Default)]
struct LedgerState {
    positions: BTreeMap<PositionKey, Position>,
    orders: BTreeMap<OrderId, Order>,
    idempotency: HashMap<(PositionKey, String), OrderId>,
    trades: Vec<Trade>,
    announcements: BTreeMap<String, DividendAnnouncement>,
    accruals: BTreeMap<(PositionKey, String), DividendAccrual>,
    outbox: VecDeque<EngineEvent>,
}

impl LedgerState {
    fn check_version(&self, position: &Position) -> Result<(), EngineError> {
        let found = self.positions.get(&position.key).map_or(0, |p| p.version);
        if found != position.version {
            return Err(EngineError::PersistenceConflict {
                key: position.key.to_string(),
                expected: position.version,
                found,
            });
        }
        Ok(())
    }

    fn store(&mut self, position: &Position) -> Position {
        let mut stored = position.clone();
        stored.version += 1;
        self.positions.insert(stored.key.clone(), stored.clone());
        stored
    }
}

/// Positions, orders, trades, dividends and the event outbox behind a single
/// lock, so the multi-record commits are atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    /// Held for a whole delivery so two publishers never send the same event.
    publishing: Mutex<()>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger pre-loaded with `positions`, stored as-is.
    #[must_use]
    pub fn with_positions(positions: impl IntoIterator<Item = Position>) -> Self {
        let state = LedgerState {
            positions: positions.into_iter().map(|p| (p.key.clone(), p)).collect(),
            ..LedgerState::default()
        };
        Self {
            state: RwLock::new(state),
            publishing: Mutex::new(()),
        }
    }

    pub async fn orders(&self) -> Vec<Order> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        orders
    }

    pub async fn all_trades(&self) -> Vec<Trade> {
        self.state.read().await.trades.clone()
    }
}

#[async_trait]
impl PositionRepository for InMemoryLedger {
    async fn get(&self, key: &PositionKey) -> Result<Option<Position>, EngineError> {
        Ok(self.state.read().await.positions.get(key).cloned())
    }

    async fn save(&self, position: &Position) -> Result<Position, EngineError> {
        let mut state = self.state.write().await;
        state.check_version(position)?;
        Ok(state.store(position))
    }

    async fn list(&self) -> Result<Vec<Position>, EngineError> {
        Ok(self.state.read().await.positions.values().cloned().collect())
    }
}

#[async_trait]
impl OrderRepository for InMemoryLedger {
    async fn find_by_idempotency_key(
        &self,
        key: &PositionKey,
        idempotency_key: &str,
    ) -> Result<Option<Order>, EngineError> {
        let state = self.state.read().await;
        Ok(state
            .idempotency
            .get(&(key.clone(), idempotency_key.to_string()))
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn insert_order(&self, order: Order, event: EngineEvent) -> Result<Order, EngineError> {
        let mut state = self.state.write().await;
        let scope = (order.key.clone(), order.idempotency_key.clone());
        if let Some(existing) = state.idempotency.get(&scope).and_then(|id| state.orders.get(id)) {
            return Ok(existing.clone());
        }
        state.idempotency.insert(scope, order.id);
        state.orders.insert(order.id, order.clone());
        state.outbox.push_back(event);
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, EngineError> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn set_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        event: EngineEvent,
    ) -> Result<Order, EngineError> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("order {id}")))?;
        if order.status.is_terminal() {
            return Err(EngineError::PersistenceConflict {
                key: format!("order {id}"),
                expected: 0,
                found: 1,
            });
        }
        order.status = status;
        let order = order.clone();
        state.outbox.push_back(event);
        Ok(order)
    }

    async fn count_orders_on(&self, key: &PositionKey, date: NaiveDate) -> Result<u32, EngineError> {
        let state = self.state.read().await;
        let count = state
            .orders
            .values()
            .filter(|o| o.key == *key && o.submitted_at.date_naive() == date)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn trade_for_order(&self, id: OrderId) -> Result<Option<Trade>, EngineError> {
        let state = self.state.read().await;
        Ok(state.trades.iter().find(|t| t.order_id == id).cloned())
    }

    async fn trades(&self, key: &PositionKey) -> Result<Vec<Trade>, EngineError> {
        let state = self.state.read().await;
        Ok(state.trades.iter().filter(|t| t.key == *key).cloned().collect())
    }

    async fn commit_fill(
        &self,
        position: &Position,
        trade: Trade,
        event: EngineEvent,
    ) -> Result<(Position, Order), EngineError> {
        let mut state = self.state.write().await;
        state.check_version(position)?;

        let order_status = state
            .orders
            .get(&trade.order_id)
            .map(|o| o.status)
            .ok_or_else(|| EngineError::NotFound(format!("order {}", trade.order_id)))?;
        if order_status != OrderStatus::Submitted
            || state.trades.iter().any(|t| t.order_id == trade.order_id)
        {
            return Err(EngineError::PersistenceConflict {
                key: format!("order {}", trade.order_id),
                expected: 0,
                found: 1,
            });
        }

        let stored = state.store(position);
        let order = match state.orders.get_mut(&trade.order_id) {
            Some(order) => {
                order.status = OrderStatus::Filled;
                order.clone()
            }
            None => return Err(EngineError::NotFound(format!("order {}", trade.order_id))),
        };
        state.trades.push(trade);
        state.outbox.push_back(event);
        Ok((stored, order))
    }
}

#[async_trait]
impl DividendRepository for InMemoryLedger {
    async fn upsert_announcement(
        &self,
        announcement: DividendAnnouncement,
    ) -> Result<DividendAnnouncement, EngineError> {
        let mut state = self.state.write().await;
        Ok(state
            .announcements
            .entry(announcement.id.clone())
            .or_insert(announcement)
            .clone())
    }

    async fn get_announcement(&self, id: &str) -> Result<Option<DividendAnnouncement>, EngineError> {
        Ok(self.state.read().await.announcements.get(id).cloned())
    }

    async fn announcements(&self) -> Result<Vec<DividendAnnouncement>, EngineError> {
        Ok(self.state.read().await.announcements.values().cloned().collect())
    }

    async fn get_accrual(
        &self,
        key: &PositionKey,
        announcement_id: &str,
    ) -> Result<Option<DividendAccrual>, EngineError> {
        let state = self.state.read().await;
        Ok(state
            .accruals
            .get(&(key.clone(), announcement_id.to_string()))
            .cloned())
    }

    async fn accruals(&self) -> Result<Vec<DividendAccrual>, EngineError> {
        Ok(self.state.read().await.accruals.values().cloned().collect())
    }

    async fn commit_accrual(
        &self,
        position: &Position,
        accrual: DividendAccrual,
        event: EngineEvent,
    ) -> Result<(Position, DividendAccrual), EngineError> {
        let mut state = self.state.write().await;
        state.check_version(position)?;
        let slot = (accrual.key.clone(), accrual.announcement_id.clone());
        if state.accruals.contains_key(&slot) {
            return Err(EngineError::PersistenceConflict {
                key: format!("accrual {}/{}", accrual.key, accrual.announcement_id),
                expected: 0,
                found: 1,
            });
        }
        let stored = state.store(position);
        state.accruals.insert(slot, accrual.clone());
        state.outbox.push_back(event);
        Ok((stored, accrual))
    }

    async fn commit_payment(
        &self,
        position: &Position,
        accrual: DividendAccrual,
        event: EngineEvent,
    ) -> Result<(Position, DividendAccrual), EngineError> {
        let mut state = self.state.write().await;
        state.check_version(position)?;
        let slot = (accrual.key.clone(), accrual.announcement_id.clone());
        match state.accruals.get(&slot) {
            Some(current) if current.status == AccrualStatus::Accrued => {}
            Some(_) => {
                return Err(EngineError::PersistenceConflict {
                    key: format!("accrual {}/{}", accrual.key, accrual.announcement_id),
                    expected: 0,
                    found: 1,
                })
            }
            None => {
                return Err(EngineError::NotFound(format!(
                    "accrual {}/{}",
                    accrual.key, accrual.announcement_id
                )))
            }
        }
        let stored = state.store(position);
        state.accruals.insert(slot, accrual.clone());
        state.outbox.push_back(event);
        Ok((stored, accrual))
    }

    async fn flag_accrual(
        &self,
        key: &PositionKey,
        announcement_id: &str,
        reason: String,
        event: EngineEvent,
    ) -> Result<DividendAccrual, EngineError> {
        let mut state = self.state.write().await;
        let accrual = state
            .accruals
            .get_mut(&(key.clone(), announcement_id.to_string()))
            .ok_or_else(|| EngineError::NotFound(format!("accrual {key}/{announcement_id}")))?;
        accrual.status = AccrualStatus::Flagged;
        accrual.flag_reason = Some(reason);
        let accrual = accrual.clone();
        state.outbox.push_back(event);
        Ok(accrual)
    }
}

#[async_trait]
impl EventOutbox for InMemoryLedger {
    async fn enqueue(&self, event: EngineEvent) -> Result<(), EngineError> {
        self.state.write().await.outbox.push_back(event);
        Ok(())
    }

    async fn publish_pending(&self, sink: &dyn EventLogger) -> Result<usize, EngineError> {
        let _publishing = self.publishing.lock().await;
        let mut delivered = 0;
        loop {
            // Only the holder of `publishing` pops, so the front stays put
            // while the sink works on it.
            let Some(event) = self.state.read().await.outbox.front().cloned() else {
                return Ok(delivered);
            };
            sink.append(event).await?;
            self.state.write().await.outbox.pop_front();
            delivered += 1;
        }
    }

    async fn pending_events(&self) -> Result<Vec<EngineEvent>, EngineError> {
        Ok(self.state.read().await.outbox.iter().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<EngineEvent>>,
}

impl InMemoryEventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<EngineEvent> {
        self.events.read().await.clone()
    }

    pub async fn of_type(&self, event_type: EventType) -> Vec<EngineEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventLogger for InMemoryEventLog {
    async fn append(&self, event: EngineEvent) -> Result<(), EngineError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

/// Serves lookups from an [`AppConfig`] held in memory. The config can be
/// swapped at runtime; lookups in flight keep the snapshot they started with.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigStore {
    config: Arc<RwLock<AppConfig>>,
}

impl StaticConfigStore {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Validates and installs `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] and keeps the current config if
    /// `config` is invalid.
    pub async fn replace(&self, config: AppConfig) -> Result<(), EngineError> {
        config.validate()?;
        *self.config.write().await = config;
        Ok(())
    }

    pub async fn snapshot(&self) -> AppConfig {
        self.config.read().await.clone()
    }
}

#[async_trait]
impl ConfigStore for StaticConfigStore {
    async fn commission_rate(&self, tenant_id: &str, asset: &str) -> Result<Decimal, EngineError> {
        let config = self.config.read().await;
        let (rate, scope) = config.commission.resolve(tenant_id, asset);
        tracing::trace!(tenant_id, asset, %rate, ?scope, "commission rate resolved");
        Ok(rate)
    }

    async fn position_settings(&self, key: &PositionKey) -> Result<PositionSettings, EngineError> {
        let config = self.config.read().await;
        let (settings, scope) = config.settings_for(key);
        tracing::trace!(position = %key, ?scope, "position settings resolved");
        Ok(settings.clone())
    }

    async fn engine_config(&self) -> Result<EngineConfig, EngineError> {
        Ok(self.config.read().await.engine.clone())
    }
}
