//! Simulation variant: replays historical bars through the shared tick
//! engine against isolated in-memory state.

pub mod data_provider;
pub mod metrics;
pub mod metrics_formatter;
pub mod replay;
pub mod runner;

pub use data_provider::HistoricalBars;
pub use metrics::{EquityPoint, MetricsCalculator, PerformanceMetrics};
pub use metrics_formatter::MetricsFormatter;
pub use replay::{ReplayClock, ReplayQuoteProvider};
pub use runner::{SimulationConfig, SimulationResult, SimulationRunner};
