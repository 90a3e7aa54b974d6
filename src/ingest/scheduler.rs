// src/ingest/scheduler.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::IngestJob;

#[derive(Clone, Copy, Debug)]
pub struct IngestSchedulerCfg {
    pub interval: Duration,
}

/// Local calendar date; the period boundary for checkpoint resets.
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// Tick every `cfg.interval` (first tick immediately) and run one invocation per
/// tick. Ticks never overlap: a slow batch delays the next tick, missed ticks are skipped.
/// A fatal run error is logged and the loop waits for the next tick.
pub async fn run_scheduled<F>(job: Arc<IngestJob>, cfg: IngestSchedulerCfg, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(target: "ingest", "scheduler stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        let today = today_local();
        match job.run_once(today).await {
            Ok(report) => tracing::debug!(
                target: "ingest",
                processed = report.processed(),
                next_in_secs = cfg.interval.as_secs(),
                "scheduled tick done"
            ),
            Err(e) => tracing::error!(target: "ingest", error = %e, "ingest run aborted"),
        }
    }
}

/// Background variant of [`run_scheduled`] that runs until the task is aborted.
pub fn spawn_scheduler(job: Arc<IngestJob>, cfg: IngestSchedulerCfg) -> JoinHandle<()> {
    tokio::spawn(run_scheduled(job, cfg, std::future::pending::<()>()))
}
