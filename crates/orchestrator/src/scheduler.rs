use crate::handle::OrchestratorHandle;
use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};
use volbal_core::SchedulerConfig;

/// Drives an [`OrchestratorHandle`] from cron: one job for tick cycles, one
/// for the dividend pass.
pub struct LiveScheduler {
    config: SchedulerConfig,
    handle: OrchestratorHandle,
}

impl LiveScheduler {
    #[must_use]
    pub const fn new(config: SchedulerConfig, handle: OrchestratorHandle) -> Self {
        Self { config, handle }
    }

    /// Registers both jobs and starts the scheduler. Returns `None` when
    /// scheduling is disabled; otherwise the running scheduler, which the
    /// caller keeps alive and shuts down.
    ///
    /// # Errors
    /// Returns an error if a cron expression is invalid or the scheduler fails to start.
    pub async fn start(self) -> Result<Option<JobScheduler>> {
        if !self.config.enabled {
            info!("live scheduler is disabled");
            return Ok(None);
        }

        info!(
            tick_cron = %self.config.tick_cron,
            dividend_cron = %self.config.dividend_cron,
            "starting live scheduler"
        );

        let scheduler = JobScheduler::new().await?;

        let handle = self.handle.clone();
        let tick_job = Job::new_async(self.config.tick_cron.as_str(), move |_uuid, _lock| {
            let handle = handle.clone();
            Box::pin(async move {
                match handle.run_cycle().await {
                    Ok(Some(summary)) => debug!(evaluated = summary.evaluated, "scheduled cycle done"),
                    Ok(None) => debug!("scheduled cycle skipped while paused"),
                    Err(e) => error!("scheduled cycle failed: {}", e),
                }
            })
        })
        .with_context(|| format!("invalid tick cron '{}'", self.config.tick_cron))?;

        let handle = self.handle.clone();
        let dividend_job = Job::new_async(self.config.dividend_cron.as_str(), move |_uuid, _lock| {
            let handle = handle.clone();
            Box::pin(async move {
                match handle.run_dividends().await {
                    Ok(Some(summary)) => debug!(paid = summary.paid, "scheduled dividend pass done"),
                    Ok(None) => debug!("scheduled dividend pass skipped while paused"),
                    Err(e) => error!("scheduled dividend pass failed: {}", e),
                }
            })
        })
        .with_context(|| format!("invalid dividend cron '{}'", self.config.dividend_cron))?;

        scheduler.add(tick_job).await?;
        scheduler.add(dividend_job).await?;
        scheduler.start().await?;

        info!("live scheduler started");
        Ok(Some(scheduler))
    }
}
