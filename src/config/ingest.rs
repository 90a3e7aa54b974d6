// src/config/ingest.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::ingest::catalog::DEFAULT_TITLE_COLUMN;
use crate::ingest::checkpoint::DEFAULT_CHECKPOINT_PATH;
use crate::ingest::error::ConfigurationFailure;
use crate::ingest::sink::DEFAULT_TABLE;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";
pub const ENV_API_KEY: &str = "OMDB_API_KEY";
pub const ENV_PG_PASSWORD: &str = "PG_PASSWORD";

fn default_catalog_column() -> String {
    DEFAULT_TITLE_COLUMN.to_string()
}
fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKPOINT_PATH)
}
fn default_batch_size() -> usize {
    5
}
fn default_interval_secs() -> u64 {
    3600
}
fn default_lock_stale_secs() -> u64 {
    6 * 3600
}
fn default_base_url() -> String {
    "http://www.omdbapi.com/".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_connect_timeout_secs() -> u64 {
    4
}
fn default_pg_port() -> u16 {
    5432
}
fn default_max_connections() -> u32 {
    2
}
fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// CSV with a header row; entries come from `catalog_column`.
    pub catalog_path: PathBuf,
    #[serde(default = "default_catalog_column")]
    pub catalog_column: String,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    /// Lookups per invocation.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,
    /// e.g. "127.0.0.1:9100"; no metrics endpoint when absent.
    #[serde(default)]
    pub metrics_addr: Option<String>,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// "ENV" means: read from OMDB_API_KEY
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub user: String,
    /// "ENV" means: read from PG_PASSWORD
    pub password: String,
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_table")]
    pub table: String,
    /// Write "0" for absent text fields instead of NULL.
    #[serde(default = "default_true")]
    pub sentinel_placeholders: bool,
}

impl IngestConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading ingest config from {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("loading {}", path.display()))
    }

    /// Config path resolution:
    /// 1) $INGEST_CONFIG_PATH
    /// 2) config/ingest.toml
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        Self::load_from_file(DEFAULT_CONFIG_PATH)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: IngestConfig = toml::from_str(s)?;
        cfg.api.api_key = resolve_secret(&cfg.api.api_key, ENV_API_KEY, "api.api_key")?;
        cfg.database.password =
            resolve_secret(&cfg.database.password, ENV_PG_PASSWORD, "database.password")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigurationFailure> {
        let invalid = |m: &str| ConfigurationFailure::Invalid(m.to_string());
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.interval_secs == 0 {
            return Err(invalid("interval_secs must be at least 1"));
        }
        if self.catalog_path.as_os_str().is_empty() {
            return Err(invalid("catalog_path is empty"));
        }
        if self.checkpoint_path.as_os_str().is_empty() {
            return Err(invalid("checkpoint_path is empty"));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(invalid("api.base_url is empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(invalid("api.timeout_secs must be at least 1"));
        }
        if self.database.user.trim().is_empty() {
            return Err(ConfigurationFailure::MissingCredential("database.user"));
        }
        crate::ingest::sink::insert_statement(&self.database.table)?;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Startup summary without secrets.
    pub fn log_summary(&self) {
        tracing::info!(
            target: "ingest",
            catalog = %self.catalog_path.display(),
            checkpoint = %self.checkpoint_path.display(),
            batch_size = self.batch_size,
            interval_secs = self.interval_secs,
            api = %self.api.base_url,
            api_key_len = self.api.api_key.len(),
            db_host = %self.database.host,
            db = %self.database.database,
            table = %self.database.table,
            "ingest config loaded"
        );
    }
}

// "ENV" defers to `var`; anything else is taken literally. Empty is never accepted.
fn resolve_secret(
    raw: &str,
    var: &str,
    field: &'static str,
) -> Result<String, ConfigurationFailure> {
    let value = if raw.trim().eq_ignore_ascii_case("env") {
        env::var(var).unwrap_or_default()
    } else {
        raw.to_string()
    };
    if value.trim().is_empty() {
        return Err(ConfigurationFailure::MissingCredential(field));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
catalog_path = "data/movies.csv"

[api]
api_key = "k"

[database]
host = "localhost"
user = "ingest"
password = "pw"
database = "films"
"#;

    #[test]
    fn defaults_fill_in() {
        let cfg = IngestConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.batch_size, 5);
        assert_eq!(cfg.interval_secs, 3600);
        assert_eq!(cfg.catalog_column, "title");
        assert_eq!(cfg.checkpoint_path, PathBuf::from("pagination_state.json"));
        assert_eq!(cfg.api.base_url, "http://www.omdbapi.com/");
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.database.table, "movies");
        assert!(cfg.database.sentinel_placeholders);
        assert!(cfg.metrics_addr.is_none());
    }

    #[test]
    fn zero_batch_is_rejected() {
        let s = MINIMAL.replace(
            "catalog_path = \"data/movies.csv\"",
            "catalog_path = \"data/movies.csv\"\nbatch_size = 0",
        );
        let err = IngestConfig::from_toml_str(&s).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn empty_api_key_is_missing_credential() {
        let s = MINIMAL.replace("api_key = \"k\"", "api_key = \"\"");
        let err = IngestConfig::from_toml_str(&s).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationFailure>(),
            Some(ConfigurationFailure::MissingCredential("api.api_key"))
        ));
    }
}
