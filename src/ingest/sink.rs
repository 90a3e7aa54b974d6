// src/ingest/sink.rs
//! Record sinks. One INSERT per record, no batching and no dedup key: a
//! record re-read after a crash (before the checkpoint write) lands twice.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::ingest::error::{ConfigurationFailure, StorageFailure};
use crate::ingest::normalize::SENTINEL_PLACEHOLDER;
use crate::ingest::types::{NormalizedRecord, RecordSink};

pub const DEFAULT_TABLE: &str = "movies";

/// PostgreSQL sink for `movies(title, release_year, rated, runtime, genre, country, awards, ratings_imdb)`.
pub struct PgRecordSink {
    pool: PgPool,
    insert_sql: String,
    sentinel_placeholders: bool,
}

impl PgRecordSink {
    pub fn new(
        pool: PgPool,
        table: &str,
        sentinel_placeholders: bool,
    ) -> Result<Self, ConfigurationFailure> {
        Ok(Self {
            pool,
            insert_sql: insert_statement(table)?,
            sentinel_placeholders,
        })
    }

    /// Lazily connected pool: an unreachable database shows up per record, not at startup.
    pub fn connect_lazy(cfg: &DatabaseConfig) -> Result<Self, ConfigurationFailure> {
        let opts = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.database);
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_lazy_with(opts);
        Self::new(pool, &cfg.table, cfg.sentinel_placeholders)
    }

    fn text<'a>(&self, v: &'a Option<String>) -> Option<&'a str> {
        match v.as_deref() {
            Some(s) => Some(s),
            None if self.sentinel_placeholders => Some(SENTINEL_PLACEHOLDER),
            None => None,
        }
    }
}

#[async_trait]
impl RecordSink for PgRecordSink {
    async fn insert(&self, record: &NormalizedRecord) -> Result<(), StorageFailure> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&self.insert_sql)
            .bind(&record.title)
            .bind(record.release_year)
            .bind(self.text(&record.rated))
            .bind(record.runtime_minutes)
            .bind(self.text(&record.genre))
            .bind(self.text(&record.country))
            .bind(self.text(&record.awards))
            .bind(record.imdb_rating)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Parameterized INSERT for `table`; the name is checked because it cannot be bound.
pub fn insert_statement(table: &str) -> Result<String, ConfigurationFailure> {
    let valid = table
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ConfigurationFailure::Invalid(format!(
            "table name {table:?} must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(format!(
        "INSERT INTO {table} \
         (title, release_year, rated, runtime, genre, country, awards, ratings_imdb) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    ))
}

/// Collects records in memory; optionally refuses some titles.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<NormalizedRecord>>,
    fail_titles: HashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: Mutex::new(Vec::new()),
            fail_titles: titles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn titles(&self) -> Vec<String> {
        self.records
            .lock()
            .expect("sink mutex poisoned")
            .iter()
            .map(|r| r.title.clone())
            .collect()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn insert(&self, record: &NormalizedRecord) -> Result<(), StorageFailure> {
        if self.fail_titles.contains(&record.title) {
            return Err(StorageFailure::Unavailable(format!(
                "refusing {:?}",
                record.title
            )));
        }
        self.records
            .lock()
            .expect("sink mutex poisoned")
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_sink(sentinel_placeholders: bool) -> PgRecordSink {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://ingest:pw@localhost/films")
            .unwrap();
        PgRecordSink::new(pool, DEFAULT_TABLE, sentinel_placeholders).unwrap()
    }

    #[tokio::test]
    async fn absent_text_becomes_placeholder_only_when_enabled() {
        let on = lazy_sink(true);
        let off = lazy_sink(false);
        let rated = Some("PG-13".to_string());

        assert_eq!(on.text(&None), Some(SENTINEL_PLACEHOLDER));
        assert_eq!(off.text(&None), None);
        assert_eq!(on.text(&rated), Some("PG-13"));
        assert_eq!(off.text(&rated), Some("PG-13"));
    }

    #[test]
    fn insert_statement_names_all_columns() {
        let sql = insert_statement("movies").unwrap();
        assert!(sql.starts_with("INSERT INTO movies "));
        assert!(sql.contains("ratings_imdb"));
        assert!(sql.contains("$8"));
    }

    #[test]
    fn insert_statement_rejects_injection() {
        assert!(insert_statement("movies; DROP TABLE x").is_err());
        assert!(insert_statement("9movies").is_err());
        assert!(insert_statement("").is_err());
    }

    #[tokio::test]
    async fn memory_sink_refuses_listed_titles() {
        let sink = MemorySink::failing_on(["Bad"]);
        let rec = |t: &str| NormalizedRecord {
            title: t.into(),
            release_year: Some(2000),
            rated: None,
            runtime_minutes: 90,
            genre: None,
            country: None,
            awards: None,
            imdb_rating: None,
        };
        assert!(sink.insert(&rec("Good")).await.is_ok());
        assert!(sink.insert(&rec("Bad")).await.is_err());
        assert_eq!(sink.titles(), vec!["Good".to_string()]);
    }
}
