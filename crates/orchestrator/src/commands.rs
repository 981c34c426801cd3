use crate::live::CycleSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use volbal_core::{AppConfig, EngineError};
use volbal_execution::DividendRunSummary;

/// Reply to a cycle or dividend request; `None` when the orchestrator is paused.
pub type RunReply<T> = oneshot::Sender<Result<Option<T>, EngineError>>;

#[derive(Debug)]
pub enum OrchestratorCommand {
    RunCycle(RunReply<CycleSummary>),
    RunDividends(RunReply<DividendRunSummary>),
    Pause,
    Resume,
    UpdateConfig(Box<AppConfig>, oneshot::Sender<Result<(), EngineError>>),
    GetStatus(oneshot::Sender<OrchestratorStatus>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrchestratorState {
    Running,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorStatus {
    pub state: OrchestratorState,
    pub cycles_run: u64,
    pub dividend_runs: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleSummary>,
    pub last_dividends: Option<DividendRunSummary>,
    pub last_error: Option<String>,
    pub last_heartbeat: DateTime<Utc>,
}
