//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (every SWEEP_INTERVAL_MS)
//!     │
//!     ├─► Dispatcher::sweep(now)
//!     │       ├─► expire offers past their deadline
//!     │       └─► dispatch bookings still searching
//!     └─► StreamHub::cleanup()
//! ```
//!
//! Offer deadlines live on the booking, so a restart loses nothing: the
//! first sweep after boot expires whatever came due while the server was down.

use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::dispatch::Dispatcher;
use crate::kernel::stream_hub::StreamHub;

/// Start the offer-deadline sweeper and hub housekeeping.
pub async fn start_scheduler(
    dispatcher: Dispatcher,
    stream_hub: StreamHub,
    sweep_interval: Duration,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    let sweep_job = Job::new_repeated_async(sweep_interval, move |_uuid, _lock| {
        let dispatcher = dispatcher.clone();
        Box::pin(async move {
            if let Err(e) = dispatcher.sweep(Utc::now()).await {
                tracing::error!(error = %e, "Offer sweep failed");
            }
        })
    })
    .context("Failed to build sweep job")?;
    scheduler.add(sweep_job).await?;

    let cleanup_job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let hub = stream_hub.clone();
        Box::pin(async move {
            hub.cleanup().await;
        })
    })
    .context("Failed to build stream cleanup job")?;
    scheduler.add(cleanup_job).await?;

    scheduler.start().await?;

    tracing::info!(
        sweep_interval_ms = sweep_interval.as_millis() as u64,
        "Scheduled tasks started (offer sweep, stream cleanup every minute)"
    );
    Ok(scheduler)
}
