// src/ingest/providers/omdb.rs
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use serde_json::Value as Json;

use crate::config::ApiConfig;
use crate::ingest::error::LookupFailure;
use crate::ingest::types::{EnrichmentClient, RawLookupResult};

/// OMDb-style lookup: `GET <base>?t=<title>&y=<year>&apikey=<key>`.
pub struct OmdbClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OmdbClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("movie-catalog-ingest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    // Errors are stripped of their URL: it carries the api key.
    async fn get(&self, query: &[(&str, &str)]) -> Result<RawLookupResult, LookupFailure> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(query)
            .send()
            .await
            .map_err(|e| LookupFailure::Network(e.without_url().to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| LookupFailure::Network(e.without_url().to_string()))?;
        let body = resp
            .text()
            .await
            .map_err(|e| LookupFailure::Decode(e.without_url().to_string()))?;
        parse_lookup_body(&body)
    }

    pub fn from_config(cfg: &ApiConfig) -> anyhow::Result<Self> {
        Self::new(
            cfg.base_url.clone(),
            cfg.api_key.clone(),
            Duration::from_secs(cfg.connect_timeout_secs),
            Duration::from_secs(cfg.timeout_secs),
        )
    }
}

#[async_trait]
impl EnrichmentClient for OmdbClient {
    async fn fetch(
        &self,
        title: &str,
        year: Option<&str>,
    ) -> Result<RawLookupResult, LookupFailure> {
        let t0 = Instant::now();
        let mut query: Vec<(&str, &str)> = vec![("t", title)];
        if let Some(y) = year.filter(|y| !y.is_empty()) {
            query.push(("y", y));
        }
        query.push(("apikey", self.api_key.as_str()));

        let result = self.get(&query).await;
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        result
    }

    fn name(&self) -> &'static str {
        "omdb"
    }
}

/// Decode a lookup body. A `"Response": "False"` answer is a rejection, not a payload.
pub fn parse_lookup_body(body: &str) -> Result<RawLookupResult, LookupFailure> {
    let v: Json = serde_json::from_str(body).map_err(|e| LookupFailure::Decode(e.to_string()))?;
    if !v.is_object() {
        return Err(LookupFailure::Decode("body is not a JSON object".into()));
    }
    let rejected = v
        .get("Response")
        .and_then(Json::as_str)
        .is_some_and(|r| r.eq_ignore_ascii_case("false"));
    if rejected {
        let msg = v
            .get("Error")
            .and_then(Json::as_str)
            .unwrap_or("no match")
            .to_string();
        return Err(LookupFailure::Rejected(msg));
    }
    serde_json::from_value(v).map_err(|e| LookupFailure::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_payload() {
        let body = r#"{
            "Title":"Inception","Year":"2010","Rated":"PG-13","Runtime":"148 min",
            "Genre":"Action, Adventure, Sci-Fi","Country":"United States, United Kingdom",
            "Awards":"Won 4 Oscars.","Ratings":[{"Source":"Internet Movie Database","Value":"8.8/10"}],
            "Response":"True"
        }"#;
        let raw = parse_lookup_body(body).unwrap();
        assert_eq!(raw.title.as_deref(), Some("Inception"));
        assert_eq!(raw.runtime.as_deref(), Some("148 min"));
        assert_eq!(raw.ratings.len(), 1);
    }

    #[test]
    fn response_false_is_rejected() {
        let body = r#"{"Response":"False","Error":"Movie not found!"}"#;
        assert_eq!(
            parse_lookup_body(body),
            Err(LookupFailure::Rejected("Movie not found!".into()))
        );
    }

    #[test]
    fn malformed_body_is_decode_failure() {
        assert!(matches!(
            parse_lookup_body("<html>oops</html>"),
            Err(LookupFailure::Decode(_))
        ));
        assert!(matches!(parse_lookup_body("[1,2]"), Err(LookupFailure::Decode(_))));
    }
}
