//! CLI command implementations.

mod backtest;
mod config;
mod trigger;

pub use backtest::{run_backtest, BacktestArgs};
pub use config::{run_config, ConfigArgs};
pub use trigger::{run_trigger, TriggerArgs};
