//! Live variant tests: concurrent cycles, failure isolation between
//! positions, the command actor and scheduler wiring.

mod common;

use chrono::NaiveDate;
use common::{at, harness, key, Harness};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use volbal_core::{
    AppConfig, CommissionSchedule, DividendAnnouncement, DividendRepository, EventType, Position,
    PositionRepository, SchedulerConfig,
};
use volbal_orchestrator::{LiveOrchestrator, LiveScheduler, OrchestratorActor, OrchestratorState};

fn config() -> AppConfig {
    let mut config = AppConfig {
        commission: CommissionSchedule::flat(dec!(0.0001)),
        ..AppConfig::default()
    };
    config.defaults.order_policy.qty_step = dec!(1);
    config
}

/// Three positions: one that trades, one inside its band, one whose quote fails.
fn three_positions() -> Harness {
    let h = harness(
        config(),
        vec![
            Position::new(key("aapl"), "AAPL", dec!(100), dec!(15000)).with_anchor(dec!(150)),
            Position::new(key("msft"), "MSFT", dec!(50), dec!(5000)).with_anchor(dec!(100)),
            Position::new(key("ko"), "KO", dec!(100), dec!(6000)).with_anchor(dec!(60)),
        ],
    );
    h.market.set_price("AAPL", dec!(156));
    h.market.set_price("MSFT", dec!(101));
    h.market.fail("KO", "upstream 503");
    h
}

// ============================================================================
// Cycles
// ============================================================================

#[tokio::test]
async fn test_cycle_isolates_quote_failures() {
    let h = three_positions();
    let live = LiveOrchestrator::new(h.engine.clone(), 4);

    let summary = live.run_cycle().await.unwrap();

    assert_eq!(summary.evaluated, 3);
    assert_eq!(summary.filled, 1);
    assert_eq!(summary.holds, 2);
    assert_eq!(summary.failed, 0);

    let evaluations = h.events.of_type(EventType::Evaluation).await;
    assert_eq!(evaluations.len(), 3);
    let ko = evaluations.iter().find(|e| e.symbol == "KO").unwrap();
    assert_eq!(ko.reason, "market_data_unavailable");
    assert_eq!(h.ledger.get(&key("aapl")).await.unwrap().unwrap().quantity, dec!(97));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_quote_does_not_block_other_positions() {
    let h = three_positions();
    h.market.stall("KO", Duration::from_secs(60));
    let live = LiveOrchestrator::new(h.engine.clone(), 1);

    let summary = live.run_cycle().await.unwrap();

    assert_eq!((summary.evaluated, summary.filled, summary.failed), (3, 1, 0));
}

#[tokio::test]
async fn test_dividend_pass_uses_shared_ledger() {
    let h = three_positions();
    let live = LiveOrchestrator::new(h.engine.clone(), 4);
    live.dividends()
        .announce(DividendAnnouncement {
            id: "KO-Q1".to_string(),
            symbol: "KO".to_string(),
            ex_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            pay_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            amount_per_share: dec!(0.46),
            withholding_rate: dec!(0),
        })
        .await
        .unwrap();

    // The clock sits on the pay date: accrue and pay in one pass.
    let summary = live.run_dividends().await.unwrap();

    assert_eq!((summary.accrued, summary.paid), (1, 1));
    let ko = h.ledger.get(&key("ko")).await.unwrap().unwrap();
    assert_eq!(ko.cash, dec!(6046.00));
}

#[tokio::test]
async fn test_delayed_dividend_pass_after_live_sell() {
    let h = harness(
        config(),
        vec![Position::new(key("ko"), "KO", dec!(100), dec!(6000)).with_anchor(dec!(60))],
    );
    let live = LiveOrchestrator::new(h.engine.clone(), 4);
    live.dividends()
        .announce(DividendAnnouncement {
            id: "KO-Q1".to_string(),
            symbol: "KO".to_string(),
            ex_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            pay_date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            amount_per_share: dec!(0.46),
            withholding_rate: dec!(0),
        })
        .await
        .unwrap();

    // Three days past the ex-date the price jumps and the cycle sells
    // before any dividend pass has run.
    h.market.set_price("KO", dec!(62.40));
    let cycle = live.run_cycle().await.unwrap();
    assert_eq!(cycle.filled, 1);
    let after_sell = h.ledger.get(&key("ko")).await.unwrap().unwrap();
    assert!(after_sell.quantity < dec!(100));

    let accrued = live.run_dividends().await.unwrap();
    assert_eq!((accrued.accrued, accrued.paid), (1, 0));
    let accrual = h.ledger.get_accrual(&key("ko"), "KO-Q1").await.unwrap().unwrap();
    assert_eq!(accrual.qty_eligible, dec!(100));
    assert_eq!(accrual.net, dec!(46.00));

    h.clock.set(at(15, 0) + chrono::Duration::days(4));
    let paid = live.run_dividends().await.unwrap();
    assert_eq!(paid.paid, 1);
    let ko = h.ledger.get(&key("ko")).await.unwrap().unwrap();
    assert_eq!(ko.total_dividends_received, dec!(46.00));
    assert_eq!(ko.quantity, after_sell.quantity);
}

// ============================================================================
// Actor and handle
// ============================================================================

#[tokio::test]
async fn test_actor_runs_commands_and_reports_status() {
    let h = three_positions();
    let live = LiveOrchestrator::new(h.engine.clone(), 4);
    let (handle, task) = OrchestratorActor::spawn(live, h.config.clone());

    let summary = handle.run_cycle().await.unwrap().unwrap();
    assert_eq!(summary.evaluated, 3);

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, OrchestratorState::Running);
    assert_eq!(status.cycles_run, 1);
    assert_eq!(status.last_cycle, Some(summary));

    handle.pause().await.unwrap();
    assert_eq!(handle.run_cycle().await.unwrap(), None);
    assert_eq!(handle.status().await.unwrap().cycles_run, 1);

    handle.resume().await.unwrap();
    assert!(handle.run_cycle().await.unwrap().is_some());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert!(handle.status().await.is_err());
}

#[tokio::test]
async fn test_actor_refuses_invalid_config() {
    let h = three_positions();
    let live = LiveOrchestrator::new(h.engine.clone(), 4);
    let (handle, _task) = OrchestratorActor::spawn(live, h.config.clone());

    let mut bad = config();
    bad.defaults.rebalance_ratio = dec!(2);
    assert!(handle.update_config(bad).await.is_err());
    assert_eq!(h.config.snapshot().await, config());

    let mut good = config();
    good.defaults.trigger.up_threshold = dec!(0.10);
    handle.update_config(good.clone()).await.unwrap();
    assert_eq!(h.config.snapshot().await, good);

    // AAPL's +4% no longer fires.
    let summary = handle.run_cycle().await.unwrap().unwrap();
    assert_eq!(summary.filled, 0);
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn test_disabled_scheduler_does_not_start() {
    let h = three_positions();
    let (handle, _task) = OrchestratorActor::spawn(LiveOrchestrator::new(h.engine.clone(), 4), h.config.clone());

    let scheduler = LiveScheduler::new(
        SchedulerConfig {
            enabled: false,
            ..SchedulerConfig::default()
        },
        handle,
    );
    assert!(scheduler.start().await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_cron_is_rejected() {
    let h = three_positions();
    let (handle, _task) = OrchestratorActor::spawn(LiveOrchestrator::new(h.engine.clone(), 4), h.config.clone());

    let scheduler = LiveScheduler::new(
        SchedulerConfig {
            tick_cron: "every minute please".to_string(),
            ..SchedulerConfig::default()
        },
        handle,
    );
    let err = scheduler.start().await.err().unwrap();
    assert!(err.to_string().contains("tick cron"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduler_drives_cycles() {
    let h = three_positions();
    let (handle, _task) = OrchestratorActor::spawn(LiveOrchestrator::new(Arc::clone(&h.engine), 4), h.config.clone());

    let mut scheduler = LiveScheduler::new(
        SchedulerConfig {
            tick_cron: "* * * * * *".to_string(),
            ..SchedulerConfig::default()
        },
        handle.clone(),
    )
    .start()
    .await
    .unwrap()
    .unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.shutdown().await.unwrap();

    assert!(handle.status().await.unwrap().cycles_run >= 1);
}
