// src/ingest/error.rs
//! Failure taxonomy for an ingestion run.
//!
//! `ConfigurationFailure` aborts the invocation before (or instead of) the
//! checkpoint write. Everything else is per-entry: logged, counted, skipped.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationFailure {
    #[error("checkpoint {path} could not be accessed: {source}")]
    CheckpointIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint {path} is corrupt: {source}")]
    CorruptCheckpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("catalog {path} could not be read: {reason}")]
    Catalog { path: PathBuf, reason: String },
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("another ingestion run holds the lock at {0}")]
    Locked(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupFailure {
    /// Connection error, timeout or non-2xx status.
    #[error("network failure: {0}")]
    Network(String),
    /// Body was not text or not the expected JSON.
    #[error("decode failure: {0}")]
    Decode(String),
    /// The API answered but reported no match (`"Response": "False"`).
    #[error("lookup rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageFailure {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why a lookup payload did not become a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("payload has no title")]
    MissingTitle,
    #[error("runtime {0:?} is not a whole number of minutes")]
    InvalidRuntime(Option<String>),
}
