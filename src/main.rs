//! Movie catalog ingest — binary entrypoint.
//!
//! `movie-catalog-ingest --once` runs a single batch and exits; without flags the
//! process runs one batch per configured interval until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use movie_catalog_ingest::ingest::scheduler::{run_scheduled, today_local, IngestSchedulerCfg};
use movie_catalog_ingest::metrics::Metrics;
use movie_catalog_ingest::{build_job, IngestConfig};

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ingest=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let once = std::env::args().skip(1).any(|a| a == "--once");

    let cfg = IngestConfig::load_default().context("loading ingest configuration")?;
    cfg.log_summary();

    let metrics = Metrics::init()?;
    if let Some(addr) = cfg.metrics_addr.as_deref() {
        metrics.serve(addr).await.context("starting metrics endpoint")?;
    }

    let job = Arc::new(build_job(&cfg)?);

    if once {
        let report = job.run_once(today_local()).await?;
        tracing::info!(target: "ingest", processed = report.processed(), "single run finished");
        return Ok(());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(target: "ingest", error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    run_scheduled(
        job,
        IngestSchedulerCfg {
            interval: cfg.interval(),
        },
        shutdown,
    )
    .await;
    Ok(())
}
