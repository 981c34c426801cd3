//! Orchestration for volatility balancing: the tick state machine shared by
//! live trading and replay, plus the live variant's concurrent cycles,
//! command actor and cron scheduling.

pub mod actor;
pub mod commands;
pub mod handle;
pub mod live;
pub mod scheduler;
pub mod tick;

pub use actor::OrchestratorActor;
pub use commands::{OrchestratorCommand, OrchestratorState, OrchestratorStatus};
pub use handle::OrchestratorHandle;
pub use live::{CycleSummary, LiveOrchestrator};
pub use scheduler::LiveScheduler;
pub use tick::{EnginePorts, TickEngine, TickReport, TickStage};
