//! Background maintenance jobs.

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::orchestrator::Orchestrator;

/// Top of every hour.
pub const CLEANUP_SCHEDULE: &str = "0 0 * * * *";

/// Builds and starts the scheduler that sweeps expired scans and cache
/// entries.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process; dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// job cannot be registered, or the scheduler fails to start.
pub async fn build_cleanup_scheduler(
    orchestrator: Orchestrator,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_cleanup_job(&scheduler, orchestrator).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_cleanup_job(
    scheduler: &JobScheduler,
    orchestrator: Orchestrator,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(CLEANUP_SCHEDULE, move |_uuid, _lock| {
        let orchestrator = orchestrator.clone();

        Box::pin(async move {
            tracing::info!("scheduler: starting scan cleanup");
            let removed = orchestrator.sweep_expired_scans();
            tracing::info!(removed, "scheduler: scan cleanup complete");
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
