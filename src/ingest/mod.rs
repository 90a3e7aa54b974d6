// src/ingest/mod.rs
//! Ingestion driver: one bounded, resumable batch per invocation.
//!
//! Each invocation loads the checkpoint, restarts from index 0 when the stored
//! date is not today, walks at most `batch_size` catalog entries strictly in
//! order (lookup → normalize → insert), and writes the advanced checkpoint once
//! at the end. Failures for one entry never stop the batch and never hold the
//! cursor back.

pub mod catalog;
pub mod checkpoint;
pub mod error;
pub mod normalize;
pub mod providers;
pub mod scheduler;
pub mod sink;
pub mod types;

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::ingest::error::{ConfigurationFailure, LookupFailure, ValidationFailure};
use crate::ingest::types::{
    CatalogEntry, Checkpoint, CheckpointStore, EnrichmentClient, RecordSink,
};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Driver invocations that reached the checkpoint write.");
        describe_counter!("ingest_entries_total", "Catalog entries visited.");
        describe_counter!(
            "ingest_records_inserted_total",
            "Normalized records written to the destination store."
        );
        describe_counter!("ingest_lookup_errors_total", "Lookup API failures.");
        describe_counter!(
            "ingest_validation_skips_total",
            "Lookup payloads dropped by normalization."
        );
        describe_counter!("ingest_storage_errors_total", "Destination store write failures.");
        describe_gauge!("ingest_checkpoint_index", "Last persisted catalog index.");
        describe_histogram!("ingest_fetch_ms", "Lookup request time in milliseconds.");
    });
}

/// Catalog indices to visit this run.
///
/// A stored date other than `today` restarts at 0. A stored index past the end
/// of the catalog (the catalog shrank) gives an empty window.
pub fn plan_window(
    checkpoint: &Checkpoint,
    today: NaiveDate,
    catalog_len: usize,
    batch_size: usize,
) -> Range<usize> {
    let start = if checkpoint.last_date == Some(today) {
        checkpoint.last_index.min(catalog_len)
    } else {
        0
    };
    let end = start.saturating_add(batch_size).min(catalog_len);
    start..end
}

/// What happened to one catalog entry.
#[derive(Debug)]
pub enum EntryOutcome {
    Inserted,
    LookupFailed(LookupFailure),
    Discarded(ValidationFailure),
    StorageFailed(String),
}

/// Per-run tallies. `end - start` entries were visited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub start: usize,
    pub end: usize,
    /// The stored checkpoint belonged to an earlier period.
    pub reset: bool,
    pub inserted: usize,
    pub lookup_failed: usize,
    pub discarded: usize,
    pub storage_failed: usize,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.end - self.start
    }
}

/// Lookup, normalize and insert a single entry. Never fails: the outcome says how far it got.
pub async fn process_entry(
    entry: &CatalogEntry,
    client: &dyn EnrichmentClient,
    sink: &dyn RecordSink,
) -> EntryOutcome {
    let raw = match client.fetch(&entry.title, entry.year.as_deref()).await {
        Ok(raw) => raw,
        Err(e) => return EntryOutcome::LookupFailed(e),
    };
    let record = match normalize::try_normalize(&raw) {
        Ok(r) => r,
        Err(e) => return EntryOutcome::Discarded(e),
    };
    match sink.insert(&record).await {
        Ok(()) => EntryOutcome::Inserted,
        Err(e) => EntryOutcome::StorageFailed(e.to_string()),
    }
}

/// Run one batch against `catalog` starting from `checkpoint`.
///
/// Pure with respect to persistence: returns the checkpoint to store next.
pub async fn run_batch(
    checkpoint: &Checkpoint,
    today: NaiveDate,
    catalog: &[CatalogEntry],
    client: &dyn EnrichmentClient,
    sink: &dyn RecordSink,
    batch_size: usize,
) -> (Checkpoint, BatchReport) {
    ensure_metrics_described();

    let window = plan_window(checkpoint, today, catalog.len(), batch_size);
    let mut report = BatchReport {
        start: window.start,
        end: window.start,
        reset: checkpoint.last_date != Some(today),
        ..Default::default()
    };
    if report.reset {
        info!(
            target: "ingest",
            stored_date = ?checkpoint.last_date,
            stored_index = checkpoint.last_index,
            %today,
            "new period, restarting catalog from the top"
        );
    }

    // Sequential on purpose: the lookup API allows `batch_size` calls per period.
    for i in window {
        let entry = &catalog[i];
        counter!("ingest_entries_total").increment(1);
        match process_entry(entry, client, sink).await {
            EntryOutcome::Inserted => {
                report.inserted += 1;
                counter!("ingest_records_inserted_total").increment(1);
                info!(target: "ingest", index = i, title = %entry.title, year = ?entry.year, "inserted");
            }
            EntryOutcome::LookupFailed(e) => {
                report.lookup_failed += 1;
                counter!("ingest_lookup_errors_total").increment(1);
                warn!(target: "ingest", index = i, title = %entry.title, year = ?entry.year, provider = client.name(), error = %e, "lookup failed, skipping");
            }
            EntryOutcome::Discarded(e) => {
                report.discarded += 1;
                counter!("ingest_validation_skips_total").increment(1);
                info!(target: "ingest", index = i, title = %entry.title, year = ?entry.year, reason = %e, "record discarded");
            }
            EntryOutcome::StorageFailed(e) => {
                report.storage_failed += 1;
                counter!("ingest_storage_errors_total").increment(1);
                warn!(target: "ingest", index = i, title = %entry.title, year = ?entry.year, error = %e, "insert failed, skipping");
            }
        }
        report.end = i + 1;
    }

    (Checkpoint::new(report.end, today), report)
}

/// Where the catalog comes from on each invocation.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    Csv { path: PathBuf, column: String },
    Static(Vec<CatalogEntry>),
}

impl CatalogSource {
    pub fn load(&self) -> Result<Vec<CatalogEntry>, ConfigurationFailure> {
        match self {
            CatalogSource::Csv { path, column } => catalog::read_catalog(path, column),
            CatalogSource::Static(v) => Ok(v.clone()),
        }
    }
}

/// The wired-up job: checkpoint store, catalog, lookup client and sink.
pub struct IngestJob {
    pub catalog: CatalogSource,
    pub batch_size: usize,
    pub client: Arc<dyn EnrichmentClient>,
    pub sink: Arc<dyn RecordSink>,
    pub store: Arc<dyn CheckpointStore>,
}

impl IngestJob {
    /// One driver invocation. Errors are fatal configuration problems; in that
    /// case no entry was processed, or (for a failed save) the checkpoint did not move.
    pub async fn run_once(&self, today: NaiveDate) -> Result<BatchReport, ConfigurationFailure> {
        let _lock = self.store.lock()?;
        let checkpoint = self.store.load()?;
        let catalog = self.catalog.load()?;

        let (next, report) = run_batch(
            &checkpoint,
            today,
            &catalog,
            self.client.as_ref(),
            self.sink.as_ref(),
            self.batch_size,
        )
        .await;

        self.store.save(&next)?;

        counter!("ingest_runs_total").increment(1);
        gauge!("ingest_checkpoint_index").set(next.last_index as f64);
        info!(
            target: "ingest",
            start = report.start,
            end = report.end,
            catalog_len = catalog.len(),
            reset = report.reset,
            inserted = report.inserted,
            lookup_failed = report.lookup_failed,
            discarded = report.discarded,
            storage_failed = report.storage_failed,
            "batch complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn window_resumes_on_same_day() {
        let cp = Checkpoint::new(3, d(1));
        assert_eq!(plan_window(&cp, d(1), 10, 5), 3..8);
        assert_eq!(plan_window(&cp, d(1), 5, 5), 3..5);
    }

    #[test]
    fn window_resets_on_new_day() {
        let cp = Checkpoint::new(7, d(1));
        assert_eq!(plan_window(&cp, d(2), 10, 5), 0..5);
        assert_eq!(plan_window(&Checkpoint::default(), d(2), 10, 5), 0..5);
    }

    #[test]
    fn window_is_empty_when_exhausted_or_shrunk() {
        assert_eq!(plan_window(&Checkpoint::new(10, d(1)), d(1), 10, 5), 10..10);
        assert_eq!(plan_window(&Checkpoint::new(12, d(1)), d(1), 10, 5), 10..10);
    }
}
