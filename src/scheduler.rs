//! Periodic driver for the listing pipeline

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::pipeline::ListingPipeline;

/// Run a pipeline tick every `period` on a background task.
///
/// Each tick runs on its own task, so a slow tick never delays the next one;
/// subscribers still being processed are skipped by the pipeline itself.
pub fn run_every(period: Duration, pipeline: ListingPipeline) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(period_secs = period.as_secs(), "Listing scheduler started");
        loop {
            ticker.tick().await;
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let report = pipeline.run_tick().await;
                info!(
                    subscribers = report.subscribers,
                    skipped = report.skipped,
                    notified = report.notified,
                    failed_sends = report.failed_sends,
                    "Listing tick finished"
                );
            });
        }
    })
}
