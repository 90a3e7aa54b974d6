// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod ingest;
pub mod metrics;

pub use crate::config::IngestConfig;
pub use crate::ingest::{BatchReport, IngestJob};

use std::sync::Arc;

use crate::ingest::checkpoint::FileCheckpointStore;
use crate::ingest::providers::omdb::OmdbClient;
use crate::ingest::sink::PgRecordSink;
use crate::ingest::CatalogSource;

/// Wire the production job (CSV catalog, OMDb client, PostgreSQL sink, file checkpoint).
pub fn build_job(cfg: &IngestConfig) -> anyhow::Result<IngestJob> {
    let client = OmdbClient::from_config(&cfg.api)?;
    let sink = PgRecordSink::connect_lazy(&cfg.database)?;
    let store = FileCheckpointStore::new(&cfg.checkpoint_path)
        .with_lock_stale_after(std::time::Duration::from_secs(cfg.lock_stale_secs));
    Ok(IngestJob {
        catalog: CatalogSource::Csv {
            path: cfg.catalog_path.clone(),
            column: cfg.catalog_column.clone(),
        },
        batch_size: cfg.batch_size,
        client: Arc::new(client),
        sink: Arc::new(sink),
        store: Arc::new(store),
    })
}
