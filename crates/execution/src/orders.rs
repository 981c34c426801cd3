//! Order lifecycle: submit, then execute exactly once.
//!
//! Both operations take a [`PositionGuard`], so callers must already hold the
//! position's lock. Execute runs inside the conflict retry; every attempt
//! reloads the order and position, so a retry after a lost race sees the
//! winner's result instead of filling twice.
//!
//! Events are queued in the ledger by the same commit that changes state and
//! flushed to the journal afterwards, so a journal outage delays the audit
//! record but never undoes or hides a fill.

use crate::locks::PositionGuard;
use crate::outbox::flush_events;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use volbal_core::{
    correlation_id, recheck_fill, BelowMinAction, ConfigStore, EngineError, EngineEvent,
    EventAction, EventLogger, EventType, Ledger, Order, OrderId, OrderStatus, PolicyCheck,
    Position, PositionKey, PricePolicy, Side, Trade, TradeId, TradeStatus,
};

const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;
const AUTO_KEY_NAMESPACE: Uuid = Uuid::from_u128(0x41c7_5d0e_93fa_4e21_8b6d_0f52_a7e9_3c18);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub key: PositionKey,
    pub side: Side,
    pub qty: Decimal,
    /// Price used for the commission estimate.
    pub reference_price: Decimal,
    /// Assigned deterministically from the request when absent.
    pub idempotency_key: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub order: Order,
    /// True when the idempotency key was already known and nothing was created.
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub order_id: OrderId,
    /// Defaults to the order quantity.
    pub fill_qty: Option<Decimal>,
    pub fill_price: Decimal,
    pub filled_at: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    Filled {
        order: Order,
        trade: Trade,
        position: Position,
    },
    /// The order was filled earlier; nothing changed this time.
    AlreadyFilled { order: Order, trade: Trade },
    /// Below minimums with `hold`, or an order skipped earlier.
    Skipped { order: Order },
    /// Below minimums with `reject`, or an order rejected earlier.
    Rejected { order: Order },
}

impl FillOutcome {
    #[must_use]
    pub fn order(&self) -> &Order {
        match self {
            Self::Filled { order, .. }
            | Self::AlreadyFilled { order, .. }
            | Self::Skipped { order }
            | Self::Rejected { order } => order,
        }
    }

    #[must_use]
    pub fn trade(&self) -> Option<&Trade> {
        match self {
            Self::Filled { trade, .. } | Self::AlreadyFilled { trade, .. } => Some(trade),
            Self::Skipped { .. } | Self::Rejected { .. } => None,
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Filled { .. } => "filled",
            Self::AlreadyFilled { .. } => "already_filled",
            Self::Skipped { .. } => "skipped",
            Self::Rejected { .. } => "rejected",
        }
    }
}

pub struct OrderService {
    ledger: Arc<dyn Ledger>,
    events: Arc<dyn EventLogger>,
    config: Arc<dyn ConfigStore>,
    retry: RetryPolicy,
}

impl OrderService {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn Ledger>,
        events: Arc<dyn EventLogger>,
        config: Arc<dyn ConfigStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            events,
            config,
            retry,
        }
    }

    /// Validates and persists an order in `submitted` status.
    ///
    /// A known idempotency key returns the original order untouched and does
    /// not count against the daily cap.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for a non-positive quantity or price, a
    ///   malformed idempotency key, or a guard for another position
    /// - [`EngineError::NotFound`] if the position does not exist
    /// - [`EngineError::DailyOrderCapReached`] once the day's allowance is used
    pub async fn submit(&self, guard: &PositionGuard, req: SubmitRequest) -> Result<SubmitOutcome, EngineError> {
        ensure_guard(guard, &req.key)?;
        if req.qty <= Decimal::ZERO {
            return Err(EngineError::Validation(format!("order quantity must be positive, got {}", req.qty)));
        }
        if req.reference_price <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "reference price must be positive, got {}",
                req.reference_price
            )));
        }
        let idempotency_key = resolve_idempotency_key(&req)?;

        if let Some(existing) = self.ledger.find_by_idempotency_key(&req.key, &idempotency_key).await? {
            info!(
                position = %req.key,
                order_id = %existing.id,
                idempotency_key = %idempotency_key,
                "duplicate submit, returning existing order"
            );
            return Ok(SubmitOutcome {
                order: existing,
                duplicate: true,
            });
        }

        let position = self.load_position(&req.key).await?;
        let settings = self.config.position_settings(&req.key).await?;
        if settings.max_orders_per_day > 0 {
            let today = self
                .ledger
                .count_orders_on(&req.key, req.submitted_at.date_naive())
                .await?;
            if today >= settings.max_orders_per_day {
                warn!(position = %req.key, cap = settings.max_orders_per_day, "daily order cap reached");
                return Err(EngineError::DailyOrderCapReached {
                    key: req.key.to_string(),
                    cap: settings.max_orders_per_day,
                });
            }
        }

        let rate = self.config.commission_rate(&req.key.tenant_id, &position.symbol).await?;
        let order = Order {
            id: OrderId::derive(&req.key, &idempotency_key),
            key: req.key.clone(),
            symbol: position.symbol.clone(),
            side: req.side,
            qty: req.qty,
            price_policy: PricePolicy::Market,
            reference_price: req.reference_price,
            commission_rate_snapshot: rate,
            commission_estimated: req.qty * req.reference_price * rate,
            idempotency_key,
            status: OrderStatus::Submitted,
            submitted_at: req.submitted_at,
        };

        let corr = req
            .correlation_id
            .unwrap_or_else(|| correlation_id(&order.key, order.submitted_at));
        let event = EngineEvent::new(
            &order.key,
            &order.symbol,
            order.submitted_at,
            corr,
            EventType::OrderSubmitted,
            side_action(order.side),
            "submitted",
        )
        .with_order(order.id);

        let stored = self.ledger.insert_order(order.clone(), event).await?;
        if stored != order {
            // Another submit with the same key got there first.
            return Ok(SubmitOutcome {
                order: stored,
                duplicate: true,
            });
        }

        info!(
            position = %stored.key,
            order_id = %stored.id,
            side = %stored.side,
            qty = %stored.qty,
            commission_rate = %stored.commission_rate_snapshot,
            "order submitted"
        );
        flush_events(self.ledger.as_ref(), self.events.as_ref()).await;

        Ok(SubmitOutcome {
            order: stored,
            duplicate: false,
        })
    }

    /// Runs the fill pipeline for a submitted order.
    ///
    /// # Errors
    ///
    /// - [`EngineError::GuardrailBreach`] when a SELL exceeds current holdings;
    ///   the order stays `submitted` and no fill is recorded
    /// - [`EngineError::Validation`] for a non-positive fill or a fill larger
    ///   than the order
    /// - [`EngineError::PersistenceConflict`] once retries are exhausted
    pub async fn execute(&self, guard: &PositionGuard, req: ExecuteRequest) -> Result<FillOutcome, EngineError> {
        let req = &req;
        self.retry
            .run("execute_order", || self.try_execute(guard, req))
            .await
    }

    async fn try_execute(&self, guard: &PositionGuard, req: &ExecuteRequest) -> Result<FillOutcome, EngineError> {
        let order = self
            .ledger
            .get_order(req.order_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("order {}", req.order_id)))?;
        ensure_guard(guard, &order.key)?;

        match order.status {
            OrderStatus::Submitted => {}
            OrderStatus::Filled => {
                let trade = self
                    .ledger
                    .trade_for_order(order.id)
                    .await?
                    .ok_or_else(|| EngineError::Storage(format!("filled order {} has no trade", order.id)))?;
                info!(order_id = %order.id, "order already filled, nothing to do");
                return Ok(FillOutcome::AlreadyFilled { order, trade });
            }
            OrderStatus::Skipped => return Ok(FillOutcome::Skipped { order }),
            OrderStatus::Rejected => return Ok(FillOutcome::Rejected { order }),
        }

        let requested = req.fill_qty.unwrap_or(order.qty);
        if requested <= Decimal::ZERO || req.fill_price <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "fill quantity and price must be positive, got {requested} @ {}",
                req.fill_price
            )));
        }
        if requested > order.qty {
            return Err(EngineError::Validation(format!(
                "fill quantity {requested} exceeds order quantity {}",
                order.qty
            )));
        }

        let corr = req
            .correlation_id
            .unwrap_or_else(|| correlation_id(&order.key, req.filled_at));
        let settings = self.config.position_settings(&order.key).await?;

        let qty = match settings.order_policy.check(requested, req.fill_price) {
            PolicyCheck::Accepted { qty } => qty,
            PolicyCheck::BelowMinimum { qty, notional, action } => {
                return self.below_minimum(order, req, corr, qty, notional, action).await;
            }
        };

        let mut position = self.load_position(&order.key).await?;
        if let Err(breach) = recheck_fill(order.side, qty, position.quantity) {
            warn!(
                position = %order.key,
                order_id = %order.id,
                requested = %qty,
                held = %position.quantity,
                "guardrail breach at execute time, fill aborted"
            );
            self.ledger
                .enqueue(
                    EngineEvent::new(
                        &order.key,
                        &order.symbol,
                        req.filled_at,
                        corr,
                        EventType::GuardrailBreach,
                        EventAction::Review,
                        breach.code(),
                    )
                    .with_order(order.id),
                )
                .await?;
            flush_events(self.ledger.as_ref(), self.events.as_ref()).await;
            return Err(breach);
        }

        let rate = self.config.commission_rate(&order.key.tenant_id, &order.symbol).await?;
        let commission = qty * req.fill_price * rate;
        apply_fill(&mut position, order.side, qty, req.fill_price, commission);

        let trade = Trade {
            id: TradeId::for_order(order.id),
            order_id: order.id,
            key: order.key.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            qty,
            price: req.fill_price,
            commission,
            commission_rate_effective: rate,
            status: TradeStatus::Executed,
            executed_at: req.filled_at,
        };

        let event = EngineEvent::new(
            &order.key,
            &order.symbol,
            req.filled_at,
            corr,
            EventType::OrderFilled,
            side_action(order.side),
            "filled",
        )
        .with_order(order.id);
        let (position, order) = self.ledger.commit_fill(&position, trade.clone(), event).await?;

        info!(
            position = %order.key,
            order_id = %order.id,
            side = %order.side,
            qty = %trade.qty,
            price = %trade.price,
            commission = %trade.commission,
            "order filled"
        );
        flush_events(self.ledger.as_ref(), self.events.as_ref()).await;

        Ok(FillOutcome::Filled {
            order,
            trade,
            position,
        })
    }

    async fn below_minimum(
        &self,
        order: Order,
        req: &ExecuteRequest,
        corr: Uuid,
        qty: Decimal,
        notional: Decimal,
        action: BelowMinAction,
    ) -> Result<FillOutcome, EngineError> {
        let (status, event_type, event_action, reason) = match action {
            BelowMinAction::Reject => (
                OrderStatus::Rejected,
                EventType::FillRejectedBelowMin,
                EventAction::Reject,
                "fill_rejected_below_min",
            ),
            BelowMinAction::Hold => (
                OrderStatus::Skipped,
                EventType::FillSkippedBelowMin,
                EventAction::Skip,
                "fill_skipped_below_min",
            ),
        };

        let event = EngineEvent::new(
            &order.key,
            &order.symbol,
            req.filled_at,
            corr,
            event_type,
            event_action,
            reason,
        )
        .with_order(order.id);
        let order = self.ledger.set_order_status(order.id, status, event).await?;
        debug!(order_id = %order.id, %qty, %notional, %action, "fill below order minimums");
        flush_events(self.ledger.as_ref(), self.events.as_ref()).await;

        Ok(match status {
            OrderStatus::Rejected => FillOutcome::Rejected { order },
            _ => FillOutcome::Skipped { order },
        })
    }

    async fn load_position(&self, key: &PositionKey) -> Result<Position, EngineError> {
        self.ledger
            .get(key)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("position {key}")))
    }
}

/// Applies an executed fill to the position. The anchor moves to the fill
/// price, which becomes the reference for the next deviation.
fn apply_fill(position: &mut Position, side: Side, qty: Decimal, price: Decimal, commission: Decimal) {
    let notional = qty * price;
    match side {
        Side::Buy => {
            let held_cost = position.avg_cost.unwrap_or(Decimal::ZERO) * position.quantity;
            position.quantity += qty;
            position.avg_cost = Some((held_cost + notional) / position.quantity);
            position.cash -= notional + commission;
        }
        Side::Sell => {
            position.quantity -= qty;
            position.cash += notional - commission;
            if position.quantity.is_zero() {
                position.avg_cost = None;
            }
        }
    }
    position.total_commission_paid += commission;
    position.anchor_price = Some(price);
}

fn ensure_guard(guard: &PositionGuard, key: &PositionKey) -> Result<(), EngineError> {
    if guard.key() != key {
        return Err(EngineError::Validation(format!(
            "lock held for {} but operation targets {key}",
            guard.key()
        )));
    }
    Ok(())
}

fn resolve_idempotency_key(req: &SubmitRequest) -> Result<String, EngineError> {
    match &req.idempotency_key {
        Some(key) => {
            let key = key.trim();
            if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(EngineError::Validation(format!(
                    "idempotency key must be 1..={MAX_IDEMPOTENCY_KEY_LEN} characters"
                )));
            }
            Ok(key.to_string())
        }
        None => {
            let name = format!(
                "{}|{}|{}|{}",
                req.key,
                req.side,
                req.qty,
                req.submitted_at.timestamp_nanos_opt().unwrap_or_else(|| req.submitted_at.timestamp())
            );
            Ok(format!("auto:{}", Uuid::new_v5(&AUTO_KEY_NAMESPACE, name.as_bytes())))
        }
    }
}

const fn side_action(side: Side) -> EventAction {
    match side {
        Side::Buy => EventAction::Buy,
        Side::Sell => EventAction::Sell,
    }
}
