// src/ingest/types.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ingest::error::{ConfigurationFailure, LookupFailure, StorageFailure};

/// One row of the catalog: a title and, when the source carried one, a 4-digit year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: String,
    pub year: Option<String>,
}

/// A single `{Source, Value}` pair from the lookup payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawRating {
    #[serde(rename = "Source", default)]
    pub source: Option<String>,
    #[serde(rename = "Value", default)]
    pub value: Option<String>,
}

/// Lookup API payload, field names as the API spells them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawLookupResult {
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "Year", default)]
    pub year: Option<String>,
    #[serde(rename = "Rated", default)]
    pub rated: Option<String>,
    #[serde(rename = "Runtime", default)]
    pub runtime: Option<String>,
    #[serde(rename = "Genre", default)]
    pub genre: Option<String>,
    #[serde(rename = "Country", default)]
    pub country: Option<String>,
    #[serde(rename = "Awards", default)]
    pub awards: Option<String>,
    #[serde(rename = "Ratings", default)]
    pub ratings: Vec<RawRating>,
}

/// Canonical row shape written to the destination store.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub title: String,
    pub release_year: Option<i32>,
    pub rated: Option<String>,
    pub runtime_minutes: i32,
    pub genre: Option<String>,
    pub country: Option<String>,
    pub awards: Option<String>,
    pub imdb_rating: Option<f64>,
}

/// Positional progress through the catalog for one period (calendar day).
///
/// On disk: `{"last_index": 3, "last_date": "2024-05-01"}`; a never-run store
/// holds `{"last_index": 0, "last_date": ""}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub last_index: usize,
    #[serde(with = "date_or_empty")]
    pub last_date: Option<NaiveDate>,
}

impl Checkpoint {
    pub fn new(last_index: usize, last_date: NaiveDate) -> Self {
        Self {
            last_index,
            last_date: Some(last_date),
        }
    }
}

mod date_or_empty {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(v: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_str(&d.format(FORMAT).to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = String::deserialize(d)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(raw, FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

/// External lookup for one `(title, year)` pair. One request per call, no retries.
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    async fn fetch(&self, title: &str, year: Option<&str>)
        -> Result<RawLookupResult, LookupFailure>;
    fn name(&self) -> &'static str;
}

/// Destination for normalized records; one write per call.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn insert(&self, record: &NormalizedRecord) -> Result<(), StorageFailure>;
}

/// Persistence for the resumable cursor.
pub trait CheckpointStore: Send + Sync {
    /// Missing state yields `Checkpoint::default()`; corrupt state is an error.
    fn load(&self) -> Result<Checkpoint, ConfigurationFailure>;
    /// Overwrites the stored state as a whole.
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), ConfigurationFailure>;
    /// Exclusive hold over the load/save cycle, released when the guard drops.
    fn lock(&self) -> Result<crate::ingest::checkpoint::RunLock, ConfigurationFailure> {
        Ok(crate::ingest::checkpoint::RunLock::noop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_json_uses_empty_string_for_missing_date() {
        let cp = Checkpoint::default();
        let s = serde_json::to_string(&cp).unwrap();
        assert_eq!(s, r#"{"last_index":0,"last_date":""}"#);

        let back: Checkpoint = serde_json::from_str(&s).unwrap();
        assert_eq!(back, cp);
    }

    #[test]
    fn checkpoint_json_reads_iso_date() {
        let cp: Checkpoint =
            serde_json::from_str(r#"{"last_index": 7, "last_date": "2024-05-01"}"#).unwrap();
        assert_eq!(cp.last_index, 7);
        assert_eq!(cp.last_date, NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn checkpoint_json_rejects_garbage_date() {
        let r: Result<Checkpoint, _> =
            serde_json::from_str(r#"{"last_index": 1, "last_date": "yesterday"}"#);
        assert!(r.is_err());
    }

    #[test]
    fn raw_lookup_tolerates_missing_fields() {
        let raw: RawLookupResult = serde_json::from_str(r#"{"Title":"Heat"}"#).unwrap();
        assert_eq!(raw.title.as_deref(), Some("Heat"));
        assert!(raw.runtime.is_none());
        assert!(raw.ratings.is_empty());
    }
}
