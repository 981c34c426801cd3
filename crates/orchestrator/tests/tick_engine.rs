//! Tick state machine tests: quote -> trigger -> guardrail -> submit/execute,
//! with exactly one evaluation event per tick whatever the outcome.

mod common;

use common::{at, engine, harness, key, OutageJournal, ScriptedMarket, TestClock, UnreachableConfig};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use volbal_core::{
    AppConfig, BelowMinAction, CommissionSchedule, EngineError, EventAction, EventOutbox, EventType,
    GuardrailReason, OrderRepository, OrderStatus, Position, PositionRepository, Side, TriggerDirection,
};
use volbal_execution::{InMemoryEventLog, InMemoryLedger, StaticConfigStore};
use volbal_orchestrator::TickStage;

fn config() -> AppConfig {
    let mut config = AppConfig {
        commission: CommissionSchedule::flat(dec!(0.0001)),
        ..AppConfig::default()
    };
    config.defaults.order_policy.qty_step = dec!(1);
    config
}

fn position(id: &str, symbol: &str, quantity: rust_decimal::Decimal, cash: rust_decimal::Decimal) -> Position {
    Position::new(key(id), symbol, quantity, cash)
}

// ============================================================================
// Trades
// ============================================================================

#[tokio::test]
async fn test_rise_past_threshold_sells() {
    // anchor 150, +4% at 156 with a 3% up threshold
    let h = harness(config(), vec![position("aapl", "AAPL", dec!(100), dec!(15000)).with_anchor(dec!(150))]);
    h.market.set_price("AAPL", dec!(156.00));

    let report = h.engine.tick(&key("aapl")).await.unwrap();

    let trigger = report.trigger.unwrap();
    assert_eq!(trigger.direction, TriggerDirection::Up);
    assert_eq!(trigger.pct_change, dec!(0.04));
    assert_eq!(report.action, EventAction::Sell);
    assert_eq!(report.reason, "filled");
    assert_eq!(
        report.stages,
        vec![
            TickStage::Loaded,
            TickStage::Quoted,
            TickStage::TriggerEvaluated,
            TickStage::GuardrailEvaluated,
            TickStage::OrderSubmitted,
            TickStage::OrderExecuted,
            TickStage::EventLogged,
        ]
    );

    let trade = report.trade().unwrap();
    assert_eq!(trade.side, Side::Sell);
    assert_eq!(trade.qty, dec!(3));
    assert_eq!(trade.commission, dec!(0.0468));

    let p = h.ledger.get(&key("aapl")).await.unwrap().unwrap();
    assert_eq!(p.quantity, dec!(97));
    assert_eq!(p.cash, dec!(15467.9532));
    assert_eq!(p.anchor_price, Some(dec!(156.00)));

    let evaluations = h.events.of_type(EventType::Evaluation).await;
    assert_eq!(evaluations.len(), 1);
    assert_eq!(evaluations[0].order_id, report.order_id);
    assert_eq!(h.events.of_type(EventType::OrderFilled).await.len(), 1);
}

#[tokio::test]
async fn test_drop_past_threshold_buys() {
    let h = harness(config(), vec![position("msft", "MSFT", dec!(50), dec!(5000)).with_anchor(dec!(100))]);
    h.market.set_price("MSFT", dec!(95));

    let report = h.engine.tick(&key("msft")).await.unwrap();

    assert_eq!(report.action, EventAction::Buy);
    let trade = report.trade().unwrap();
    assert_eq!((trade.side, trade.qty), (Side::Buy, dec!(2)));

    let p = h.ledger.get(&key("msft")).await.unwrap().unwrap();
    assert_eq!(p.quantity, dec!(52));
    assert_eq!(p.cash, dec!(4809.981));
}

// ============================================================================
// Holds
// ============================================================================

#[tokio::test]
async fn test_inside_band_holds() {
    let h = harness(config(), vec![position("aapl", "AAPL", dec!(100), dec!(15000)).with_anchor(dec!(150))]);
    h.market.set_price("AAPL", dec!(152));

    let report = h.engine.tick(&key("aapl")).await.unwrap();

    assert!(report.is_hold());
    assert_eq!(report.reason, "no_trigger");
    assert_eq!(
        report.stages,
        vec![TickStage::Loaded, TickStage::Quoted, TickStage::TriggerEvaluated, TickStage::Hold]
    );
    let events = h.events.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Evaluation);
    assert_eq!(events[0].action, EventAction::Hold);
    assert!(events[0].trigger_decision.is_some());
    assert!(events[0].guardrail_decision.is_none());
}

#[tokio::test]
async fn test_missing_anchor_is_initialized_from_quote() {
    let h = harness(config(), vec![position("aapl", "AAPL", dec!(10), dec!(1000))]);
    h.market.set_price("AAPL", dec!(120));

    let first = h.engine.tick(&key("aapl")).await.unwrap();
    assert_eq!(first.reason, "anchor_initialized");
    assert_eq!(first.trigger.unwrap().direction, TriggerDirection::None);
    assert_eq!(
        h.ledger.get(&key("aapl")).await.unwrap().unwrap().anchor_price,
        Some(dec!(120))
    );

    h.clock.set(at(15, 1));
    let second = h.engine.tick(&key("aapl")).await.unwrap();
    assert_eq!(second.reason, "no_trigger");
    assert_eq!(h.events.of_type(EventType::Evaluation).await.len(), 2);
}

#[tokio::test]
async fn test_zero_anchor_counts_as_missing() {
    let h = harness(config(), vec![position("aapl", "AAPL", dec!(10), dec!(1000)).with_anchor(dec!(0))]);
    h.market.set_price("AAPL", dec!(120));

    let report = h.engine.tick(&key("aapl")).await.unwrap();
    assert_eq!(report.reason, "anchor_initialized");
}

#[tokio::test]
async fn test_missing_anchor_holds_when_initialization_disabled() {
    let mut cfg = config();
    cfg.engine.initialize_missing_anchor = false;
    let h = harness(cfg, vec![position("aapl", "AAPL", dec!(10), dec!(1000))]);
    h.market.set_price("AAPL", dec!(120));

    let report = h.engine.tick(&key("aapl")).await.unwrap();
    assert_eq!(report.reason, "no_anchor");
    assert_eq!(h.ledger.get(&key("aapl")).await.unwrap().unwrap().anchor_price, None);
}

#[tokio::test]
async fn test_anomalous_deviation_resets_anchor() {
    let h = harness(config(), vec![position("aapl", "AAPL", dec!(10), dec!(1000)).with_anchor(dec!(100))]);
    h.market.set_price("AAPL", dec!(160));

    let report = h.engine.tick(&key("aapl")).await.unwrap();

    assert_eq!(report.reason, "anchor_reset");
    assert!(report.trade().is_none());
    let p = h.ledger.get(&key("aapl")).await.unwrap().unwrap();
    assert_eq!(p.anchor_price, Some(dec!(160)));
    assert_eq!(p.quantity, dec!(10));
}

#[tokio::test]
async fn test_reset_threshold_is_strict() {
    let h = harness(config(), vec![position("aapl", "AAPL", dec!(10), dec!(1000)).with_anchor(dec!(100))]);
    h.market.set_price("AAPL", dec!(150));

    let report = h.engine.tick(&key("aapl")).await.unwrap();

    assert_ne!(report.reason, "anchor_reset");
    assert_eq!(report.action, EventAction::Sell);
}

#[tokio::test]
async fn test_allocation_ceiling_holds_with_guardrail_reason() {
    // 9500 of 10500 in stock is above the 75% ceiling
    let h = harness(config(), vec![position("aapl", "AAPL", dec!(100), dec!(1000)).with_anchor(dec!(100))]);
    h.market.set_price("AAPL", dec!(95));

    let report = h.engine.tick(&key("aapl")).await.unwrap();

    assert_eq!(report.reason, "at_max_allocation");
    assert_eq!(report.guardrail.unwrap().reason, GuardrailReason::AtMaxAllocation);
    assert_eq!(report.final_stage(), Some(TickStage::Hold));
    let events = h.events.events().await;
    assert_eq!(events.len(), 1);
    assert!(events[0].guardrail_decision.is_some());
}

#[tokio::test]
async fn test_below_minimum_fill_is_skipped() {
    let mut cfg = config();
    cfg.defaults.order_policy.min_notional = dec!(1000000);
    cfg.defaults.order_policy.action_below_min = BelowMinAction::Hold;
    let h = harness(cfg, vec![position("msft", "MSFT", dec!(50), dec!(5000)).with_anchor(dec!(100))]);
    h.market.set_price("MSFT", dec!(95));

    let report = h.engine.tick(&key("msft")).await.unwrap();

    assert_eq!(report.action, EventAction::Skip);
    assert_eq!(report.reason, "fill_skipped_below_min");
    assert_eq!(report.final_stage(), Some(TickStage::EventLogged));
    assert_eq!(report.fill.as_ref().unwrap().order().status, OrderStatus::Skipped);

    let p = h.ledger.get(&key("msft")).await.unwrap().unwrap();
    assert_eq!((p.quantity, p.cash), (dec!(50), dec!(5000)));
    assert_eq!(h.events.of_type(EventType::FillSkippedBelowMin).await.len(), 1);
    assert_eq!(h.events.of_type(EventType::Evaluation).await.len(), 1);
}

#[tokio::test]
async fn test_daily_cap_turns_into_hold() {
    let mut cfg = config();
    cfg.defaults.max_orders_per_day = 1;
    let h = harness(cfg, vec![position("msft", "MSFT", dec!(50), dec!(5000)).with_anchor(dec!(100))]);

    h.market.set_price("MSFT", dec!(95));
    let first = h.engine.tick(&key("msft")).await.unwrap();
    assert_eq!(first.action, EventAction::Buy);

    h.clock.set(at(15, 1));
    h.market.set_price("MSFT", dec!(90));
    let second = h.engine.tick(&key("msft")).await.unwrap();

    assert_eq!(second.reason, "daily_order_cap_reached");
    assert_eq!(second.order_id, None);
    assert_eq!(
        second.stages,
        vec![
            TickStage::Loaded,
            TickStage::Quoted,
            TickStage::TriggerEvaluated,
            TickStage::GuardrailEvaluated,
            TickStage::Hold,
        ]
    );
    assert_eq!(h.events.of_type(EventType::Evaluation).await.len(), 2);
}

// ============================================================================
// Market data failures
// ============================================================================

#[tokio::test]
async fn test_quote_failure_holds_with_reason() {
    let h = harness(config(), vec![position("aapl", "AAPL", dec!(100), dec!(15000)).with_anchor(dec!(150))]);
    h.market.fail("AAPL", "connection reset");

    let report = h.engine.tick(&key("aapl")).await.unwrap();

    assert_eq!(report.reason, "market_data_unavailable");
    assert_eq!(report.stages, vec![TickStage::Loaded, TickStage::Hold]);
    assert_eq!(report.price, None);
    let events = h.events.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "market_data_unavailable");
    assert!(events[0].trigger_decision.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_quote_timeout_holds() {
    let h = harness(config(), vec![position("aapl", "AAPL", dec!(100), dec!(15000)).with_anchor(dec!(150))]);
    h.market.stall("AAPL", Duration::from_secs(30));

    let report = h.engine.tick(&key("aapl")).await.unwrap();

    assert_eq!(report.reason, "market_data_unavailable");
    assert_eq!(h.events.len().await, 1);
}

// ============================================================================
// Failing ports
// ============================================================================

#[tokio::test]
async fn test_fill_is_reported_while_journal_is_down() {
    let ledger = Arc::new(InMemoryLedger::with_positions([
        position("aapl", "AAPL", dec!(100), dec!(15000)).with_anchor(dec!(150)),
    ]));
    let journal = Arc::new(OutageJournal::default());
    journal.set_down(true);
    let market = Arc::new(ScriptedMarket::default());
    market.set_price("AAPL", dec!(156.00));
    let engine = engine(
        ledger.clone(),
        journal.clone(),
        Arc::new(StaticConfigStore::new(config())),
        market,
        Arc::new(TestClock::new(at(15, 0))),
    );

    let report = engine.tick(&key("aapl")).await.unwrap();

    assert_eq!(report.action, EventAction::Sell);
    assert_eq!(report.reason, "filled");
    assert_eq!(report.final_stage(), Some(TickStage::EventLogged));
    assert_eq!(report.trade().unwrap().qty, dec!(3));
    assert_eq!(ledger.get(&key("aapl")).await.unwrap().unwrap().quantity, dec!(97));
    assert!(journal.accepted.is_empty().await);

    let queued: Vec<EventType> = ledger
        .pending_events()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        queued,
        vec![EventType::OrderSubmitted, EventType::OrderFilled, EventType::Evaluation]
    );

    // The next tick delivers the backlog ahead of its own record.
    journal.set_down(false);
    let next = engine.tick(&key("aapl")).await.unwrap();
    assert_eq!(next.reason, "no_trigger");
    let delivered: Vec<(EventType, String)> = journal
        .accepted
        .events()
        .await
        .into_iter()
        .map(|e| (e.event_type, e.reason))
        .collect();
    assert_eq!(
        delivered,
        vec![
            (EventType::OrderSubmitted, "submitted".to_string()),
            (EventType::OrderFilled, "filled".to_string()),
            (EventType::Evaluation, "filled".to_string()),
            (EventType::Evaluation, "no_trigger".to_string()),
        ]
    );
    assert!(ledger.pending_events().await.unwrap().is_empty());
    assert_eq!(ledger.trades(&key("aapl")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_config_failure_holds_with_logged_event() {
    let ledger = Arc::new(InMemoryLedger::with_positions([
        position("aapl", "AAPL", dec!(100), dec!(15000)).with_anchor(dec!(150)),
    ]));
    let events = Arc::new(InMemoryEventLog::new());
    let market = Arc::new(ScriptedMarket::default());
    market.set_price("AAPL", dec!(156.00));
    let engine = engine(
        ledger.clone(),
        events.clone(),
        Arc::new(UnreachableConfig),
        market,
        Arc::new(TestClock::new(at(15, 0))),
    );

    let report = engine.tick(&key("aapl")).await.unwrap();

    assert!(report.is_hold());
    assert_eq!(report.reason, "config_error");
    assert_eq!(report.stages, vec![TickStage::Loaded, TickStage::Hold]);
    let evaluations = events.of_type(EventType::Evaluation).await;
    assert_eq!(evaluations.len(), 1);
    assert_eq!(evaluations[0].reason, "config_error");
    assert_eq!(evaluations[0].action, EventAction::Hold);
    assert_eq!(ledger.get(&key("aapl")).await.unwrap().unwrap().quantity, dec!(100));
}

#[tokio::test]
async fn test_unknown_position_is_an_error() {
    let h = harness(config(), vec![]);
    let err = h.engine.tick(&key("ghost")).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert!(h.events.is_empty().await);
}
