use crate::commands::{OrchestratorCommand, OrchestratorState, OrchestratorStatus};
use crate::handle::OrchestratorHandle;
use crate::live::LiveOrchestrator;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use volbal_execution::StaticConfigStore;

const COMMAND_BUFFER: usize = 32;

/// Owns the live orchestrator and runs its commands one at a time, so two
/// cycles never overlap.
pub struct OrchestratorActor {
    orchestrator: LiveOrchestrator,
    config: Arc<StaticConfigStore>,
    rx: mpsc::Receiver<OrchestratorCommand>,
    status: OrchestratorStatus,
}

impl OrchestratorActor {
    #[must_use]
    pub fn new(
        orchestrator: LiveOrchestrator,
        config: Arc<StaticConfigStore>,
        rx: mpsc::Receiver<OrchestratorCommand>,
    ) -> Self {
        Self {
            orchestrator,
            config,
            rx,
            status: OrchestratorStatus {
                state: OrchestratorState::Running,
                cycles_run: 0,
                dividend_runs: 0,
                last_cycle_at: None,
                last_cycle: None,
                last_dividends: None,
                last_error: None,
                last_heartbeat: Utc::now(),
            },
        }
    }

    /// Spawns the actor on the runtime and returns a handle to it.
    #[must_use]
    pub fn spawn(orchestrator: LiveOrchestrator, config: Arc<StaticConfigStore>) -> (OrchestratorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = Self::new(orchestrator, config, rx);
        let task = tokio::spawn(actor.run());
        (OrchestratorHandle::new(tx), task)
    }

    pub async fn run(mut self) {
        info!("orchestrator started");

        while let Some(cmd) = self.rx.recv().await {
            self.status.last_heartbeat = Utc::now();
            match cmd {
                OrchestratorCommand::RunCycle(reply) => {
                    if self.status.state == OrchestratorState::Paused {
                        let _ = reply.send(Ok(None));
                        continue;
                    }
                    let at = self.orchestrator.engine().clock().now();
                    let result = self.orchestrator.run_cycle().await;
                    match &result {
                        Ok(summary) => {
                            self.status.cycles_run += 1;
                            self.status.last_cycle_at = Some(at);
                            self.status.last_cycle = Some(summary.clone());
                        }
                        Err(e) => {
                            error!(error = %e, "cycle failed");
                            self.status.last_error = Some(e.to_string());
                        }
                    }
                    let _ = reply.send(result.map(Some));
                }
                OrchestratorCommand::RunDividends(reply) => {
                    if self.status.state == OrchestratorState::Paused {
                        let _ = reply.send(Ok(None));
                        continue;
                    }
                    let result = self.orchestrator.run_dividends().await;
                    match &result {
                        Ok(summary) => {
                            self.status.dividend_runs += 1;
                            self.status.last_dividends = Some(summary.clone());
                        }
                        Err(e) => {
                            error!(error = %e, "dividend pass failed");
                            self.status.last_error = Some(e.to_string());
                        }
                    }
                    let _ = reply.send(result.map(Some));
                }
                OrchestratorCommand::Pause => {
                    if self.status.state == OrchestratorState::Paused {
                        warn!("orchestrator already paused, ignoring pause");
                        continue;
                    }
                    info!("orchestrator paused");
                    self.status.state = OrchestratorState::Paused;
                }
                OrchestratorCommand::Resume => {
                    if self.status.state == OrchestratorState::Running {
                        warn!("orchestrator not paused, ignoring resume");
                        continue;
                    }
                    info!("orchestrator resumed");
                    self.status.state = OrchestratorState::Running;
                }
                OrchestratorCommand::UpdateConfig(config, reply) => {
                    let result = self.config.replace(*config).await;
                    match &result {
                        Ok(()) => info!("configuration replaced"),
                        Err(e) => warn!(error = %e, "configuration update refused"),
                    }
                    let _ = reply.send(result);
                }
                OrchestratorCommand::GetStatus(reply) => {
                    let _ = reply.send(self.status.clone());
                }
                OrchestratorCommand::Shutdown => {
                    info!("orchestrator shutting down");
                    break;
                }
            }
        }

        info!("orchestrator stopped");
    }
}
