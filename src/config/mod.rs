pub mod ingest;

pub use ingest::{ApiConfig, DatabaseConfig, IngestConfig};
