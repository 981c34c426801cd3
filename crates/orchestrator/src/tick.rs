//! One evaluation tick for one position.
//!
//! The same [`TickEngine`] drives live cycles and simulated replay; the two
//! differ only in the clock and quote provider they hand it. Every tick that
//! finds its position records exactly one `evaluation` event, HOLDs included.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use volbal_core::{
    correlation_id, evaluate_guardrail, evaluate_trigger, Clock, ConfigStore, EngineError, EngineEvent,
    EventAction, EventLogger, EventType, GuardrailDecision, GuardrailInput, Ledger, MarketDataProvider,
    OrderId, Position, PositionKey, Quote, Side, SizingContext, Trade, TriggerDecision, TriggerDirection,
};
use volbal_execution::{
    flush_events, DividendProcessor, ExecuteRequest, FillOutcome, OrderService, PositionGuard, PositionLocks,
    RetryPolicy, SubmitRequest,
};

const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickStage {
    Loaded,
    Quoted,
    TriggerEvaluated,
    GuardrailEvaluated,
    /// Terminal: no order this tick.
    Hold,
    OrderSubmitted,
    OrderExecuted,
    /// Terminal: an order went through the fill pipeline.
    EventLogged,
}

/// What happened during one tick, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub key: PositionKey,
    pub symbol: String,
    pub at: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub stages: Vec<TickStage>,
    pub action: EventAction,
    pub reason: String,
    pub price: Option<Decimal>,
    pub trigger: Option<TriggerDecision>,
    pub guardrail: Option<GuardrailDecision>,
    pub order_id: Option<OrderId>,
    pub fill: Option<FillOutcome>,
}

impl TickReport {
    fn start(position: &Position, at: DateTime<Utc>) -> Self {
        Self {
            key: position.key.clone(),
            symbol: position.symbol.clone(),
            at,
            correlation_id: correlation_id(&position.key, at),
            stages: vec![TickStage::Loaded],
            action: EventAction::Hold,
            reason: String::new(),
            price: None,
            trigger: None,
            guardrail: None,
            order_id: None,
            fill: None,
        }
    }

    fn hold(&mut self, reason: &str) {
        self.action = EventAction::Hold;
        self.reason = reason.to_string();
        self.stages.push(TickStage::Hold);
    }

    #[must_use]
    pub fn is_hold(&self) -> bool {
        self.action == EventAction::Hold
    }

    #[must_use]
    pub fn final_stage(&self) -> Option<TickStage> {
        self.stages.last().copied()
    }

    /// The trade this tick produced, if it filled.
    #[must_use]
    pub fn trade(&self) -> Option<&Trade> {
        match &self.fill {
            Some(FillOutcome::Filled { trade, .. }) => Some(trade),
            _ => None,
        }
    }

    fn to_event(&self) -> EngineEvent {
        let mut event = EngineEvent::new(
            &self.key,
            &self.symbol,
            self.at,
            self.correlation_id,
            EventType::Evaluation,
            self.action,
            &self.reason,
        );
        if let Some(trigger) = self.trigger {
            event = event.with_trigger(trigger);
        }
        if let Some(guardrail) = self.guardrail {
            event = event.with_guardrail(guardrail);
        }
        if let Some(order_id) = self.order_id {
            event = event.with_order(order_id);
        }
        event
    }
}

/// The ports a [`TickEngine`] runs against.
#[derive(Clone)]
pub struct EnginePorts {
    pub ledger: Arc<dyn Ledger>,
    pub events: Arc<dyn EventLogger>,
    pub config: Arc<dyn ConfigStore>,
    pub market: Arc<dyn MarketDataProvider>,
    pub clock: Arc<dyn Clock>,
}

pub struct TickEngine {
    ports: EnginePorts,
    locks: PositionLocks,
    retry: RetryPolicy,
    orders: OrderService,
    quote_timeout: Duration,
}

impl TickEngine {
    #[must_use]
    pub fn new(ports: EnginePorts, locks: PositionLocks, retry: RetryPolicy) -> Self {
        let orders = OrderService::new(
            Arc::clone(&ports.ledger),
            Arc::clone(&ports.events),
            Arc::clone(&ports.config),
            retry,
        );
        Self {
            ports,
            locks,
            retry,
            orders,
            quote_timeout: DEFAULT_QUOTE_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_quote_timeout(mut self, timeout: Duration) -> Self {
        self.quote_timeout = timeout;
        self
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ports.ledger
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.ports.clock
    }

    #[must_use]
    pub const fn orders(&self) -> &OrderService {
        &self.orders
    }

    #[must_use]
    pub const fn locks(&self) -> &PositionLocks {
        &self.locks
    }

    /// A dividend processor over the same ledger, journal and locks, so
    /// settlements serialize against ticks.
    #[must_use]
    pub fn dividend_processor(&self) -> DividendProcessor {
        DividendProcessor::new(
            Arc::clone(&self.ports.ledger),
            Arc::clone(&self.ports.events),
            self.locks.clone(),
            self.retry,
        )
    }

    /// Runs one tick for `key` at the clock's current time.
    ///
    /// Failures after the position is loaded (configuration lookups, quote
    /// timeouts, daily cap, execute-time breaches, storage errors) turn into
    /// a logged HOLD whose reason is the error code. The evaluation event is
    /// queued in the ledger and flushed to the journal; a journal outage
    /// leaves it queued and does not fail the tick.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the position does not exist
    /// - any error from queueing the evaluation event of a tick that did not fill
    pub async fn tick(&self, key: &PositionKey) -> Result<TickReport, EngineError> {
        let guard = self.locks.acquire(key).await;
        let at = self.ports.clock.now();

        let position = self
            .ports
            .ledger
            .get(key)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("position {key}")))?;

        let mut report = TickReport::start(&position, at);
        debug!(position = %key, correlation_id = %report.correlation_id, "tick loaded");

        if let Err(e) = self.evaluate(&guard, position, &mut report).await {
            warn!(
                position = %key,
                correlation_id = %report.correlation_id,
                error = %e,
                "tick held on error"
            );
            report.hold(e.code());
        }

        match self.ports.ledger.enqueue(report.to_event()).await {
            Ok(()) => {
                flush_events(self.ports.ledger.as_ref(), self.ports.events.as_ref()).await;
                if !report.is_hold() {
                    report.stages.push(TickStage::EventLogged);
                }
            }
            // The order outcome is already committed; report it even though
            // its evaluation record is missing.
            Err(e) if report.fill.is_some() => {
                error!(
                    position = %key,
                    correlation_id = %report.correlation_id,
                    error = %e,
                    "evaluation event not recorded"
                );
            }
            Err(e) => return Err(e),
        }
        Ok(report)
    }

    async fn evaluate(
        &self,
        guard: &PositionGuard,
        mut position: Position,
        report: &mut TickReport,
    ) -> Result<(), EngineError> {
        let settings = self.ports.config.position_settings(&report.key).await?;
        let engine = self.ports.config.engine_config().await?;

        let price = self.fetch_quote(&position.symbol).await?.price;
        report.price = Some(price);
        report.stages.push(TickStage::Quoted);

        let trigger = evaluate_trigger(price, position.anchor_price, &settings.trigger);
        report.trigger = Some(trigger);
        report.stages.push(TickStage::TriggerEvaluated);

        let Some(anchor) = position.anchor_price.filter(|a| !a.is_zero()) else {
            if !engine.initialize_missing_anchor {
                report.hold("no_anchor");
                return Ok(());
            }
            position.anchor_price = Some(price);
            self.ports.ledger.save(&position).await?;
            info!(position = %report.key, anchor = %price, "anchor initialized");
            report.hold("anchor_initialized");
            return Ok(());
        };

        if trigger.pct_change.abs() > engine.anchor_reset_threshold {
            position.anchor_price = Some(price);
            self.ports.ledger.save(&position).await?;
            warn!(
                position = %report.key,
                old_anchor = %anchor,
                new_anchor = %price,
                pct_change = %trigger.pct_change,
                "anchor deviates past reset threshold, resetting"
            );
            report.hold("anchor_reset");
            return Ok(());
        }

        let (side, threshold) = match trigger.direction {
            TriggerDirection::None => {
                report.hold("no_trigger");
                return Ok(());
            }
            TriggerDirection::Up => (Side::Sell, settings.trigger.up_threshold),
            TriggerDirection::Down => (Side::Buy, settings.trigger.down_threshold),
        };

        let desired = settings.sizing.desired_quantity(&SizingContext {
            price,
            anchor,
            cash: position.cash,
            shares: position.quantity,
            rebalance_ratio: settings.rebalance_ratio,
            threshold,
            side,
        });
        let decision = evaluate_guardrail(
            &GuardrailInput {
                quantity: position.quantity,
                cash: position.cash,
                price,
                side,
                requested_qty: desired,
            },
            &settings.guardrail,
        );
        report.guardrail = Some(decision);
        report.stages.push(TickStage::GuardrailEvaluated);
        debug!(
            position = %report.key,
            %side,
            desired = %desired,
            allowed_qty = %decision.qty,
            reason = decision.reason.code(),
            "guardrail evaluated"
        );

        if !decision.allowed {
            if decision.breach {
                warn!(position = %report.key, requested = %desired, held = %position.quantity, "sizing asked to sell more than held");
            }
            report.hold(decision.reason.code());
            return Ok(());
        }

        let submitted = self
            .orders
            .submit(
                guard,
                SubmitRequest {
                    key: report.key.clone(),
                    side,
                    qty: decision.qty,
                    reference_price: price,
                    idempotency_key: Some(format!("tick:{}", report.correlation_id)),
                    submitted_at: report.at,
                    correlation_id: Some(report.correlation_id),
                },
            )
            .await?;
        report.order_id = Some(submitted.order.id);
        report.stages.push(TickStage::OrderSubmitted);

        let outcome = self
            .orders
            .execute(
                guard,
                ExecuteRequest {
                    order_id: submitted.order.id,
                    fill_qty: None,
                    fill_price: price,
                    filled_at: report.at,
                    correlation_id: Some(report.correlation_id),
                },
            )
            .await?;
        report.stages.push(TickStage::OrderExecuted);

        let (action, reason) = match &outcome {
            FillOutcome::Filled { .. } => (side_action(side), "filled"),
            FillOutcome::AlreadyFilled { .. } => (side_action(side), "already_filled"),
            FillOutcome::Skipped { .. } => (EventAction::Skip, "fill_skipped_below_min"),
            FillOutcome::Rejected { .. } => (EventAction::Reject, "fill_rejected_below_min"),
        };
        report.action = action;
        report.reason = reason.to_string();
        report.fill = Some(outcome);
        Ok(())
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, EngineError> {
        let unavailable = |reason: String| EngineError::MarketDataUnavailable {
            symbol: symbol.to_string(),
            reason,
        };
        match tokio::time::timeout(self.quote_timeout, self.ports.market.get_quote(symbol)).await {
            Ok(Ok(quote)) if quote.price > Decimal::ZERO => Ok(quote),
            Ok(Ok(quote)) => Err(unavailable(format!("non-positive price {}", quote.price))),
            Ok(Err(e @ EngineError::MarketDataUnavailable { .. })) => Err(e),
            Ok(Err(e)) => Err(unavailable(e.to_string())),
            Err(_) => Err(unavailable(format!(
                "timed out after {}ms",
                self.quote_timeout.as_millis()
            ))),
        }
    }
}

const fn side_action(side: Side) -> EventAction {
    match side {
        Side::Buy => EventAction::Buy,
        Side::Sell => EventAction::Sell,
    }
}
