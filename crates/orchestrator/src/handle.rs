use crate::commands::{OrchestratorCommand, OrchestratorStatus};
use crate::live::CycleSummary;
use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use volbal_core::AppConfig;
use volbal_execution::DividendRunSummary;

#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<OrchestratorCommand>,
}

impl OrchestratorHandle {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<OrchestratorCommand>) -> Self {
        Self { tx }
    }

    /// Runs one tick cycle and waits for it. `None` while paused.
    ///
    /// # Errors
    /// Returns an error if the actor is gone or the positions cannot be listed.
    pub async fn run_cycle(&self) -> Result<Option<CycleSummary>> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(OrchestratorCommand::RunCycle(tx)).await?;
        Ok(rx.await??)
    }

    /// Runs one dividend pass and waits for it. `None` while paused.
    ///
    /// # Errors
    /// Returns an error if the actor is gone or the ledger cannot be listed.
    pub async fn run_dividends(&self) -> Result<Option<DividendRunSummary>> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(OrchestratorCommand::RunDividends(tx)).await?;
        Ok(rx.await??)
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the actor.
    pub async fn pause(&self) -> Result<()> {
        self.tx.send(OrchestratorCommand::Pause).await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the actor.
    pub async fn resume(&self) -> Result<()> {
        self.tx.send(OrchestratorCommand::Resume).await?;
        Ok(())
    }

    /// Replaces the configuration used from the next tick on.
    ///
    /// # Errors
    /// Returns an error if the actor is gone or the new configuration is invalid.
    pub async fn update_config(&self, config: AppConfig) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(OrchestratorCommand::UpdateConfig(Box::new(config), tx))
            .await?;
        rx.await??;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the command cannot be sent or the response cannot be received.
    pub async fn status(&self) -> Result<OrchestratorStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(OrchestratorCommand::GetStatus(tx)).await?;
        let status = rx.await?;
        Ok(status)
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(OrchestratorCommand::Shutdown).await?;
        Ok(())
    }
}
