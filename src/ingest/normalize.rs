// src/ingest/normalize.rs
//! Lookup payload → canonical record.

use crate::ingest::error::ValidationFailure;
use crate::ingest::types::{NormalizedRecord, RawLookupResult};

/// Rating source whose value becomes `imdb_rating`.
pub const IMDB_SOURCE: &str = "Internet Movie Database";

/// Placeholder written for absent text fields when the sink is configured for it.
pub const SENTINEL_PLACEHOLDER: &str = "0";

/// `None` when the payload cannot become a record (no title, or no usable runtime).
pub fn normalize(raw: &RawLookupResult) -> Option<NormalizedRecord> {
    try_normalize(raw).ok()
}

pub fn try_normalize(raw: &RawLookupResult) -> Result<NormalizedRecord, ValidationFailure> {
    // A placeholder title is as good as none.
    let title = present(&raw.title)
        .filter(|t| t != SENTINEL_PLACEHOLDER)
        .ok_or(ValidationFailure::MissingTitle)?;
    let runtime_minutes = parse_runtime(raw.runtime.as_deref())
        .ok_or_else(|| ValidationFailure::InvalidRuntime(raw.runtime.clone()))?;

    Ok(NormalizedRecord {
        title,
        release_year: raw.year.as_deref().and_then(parse_release_year),
        rated: present(&raw.rated),
        runtime_minutes,
        genre: present(&raw.genre),
        country: present(&raw.country),
        awards: present(&raw.awards),
        imdb_rating: imdb_rating(raw),
    })
}

/// `"142 min"` → 142. Absent, `"N/A"`, non-numeric or non-positive → `None`.
pub fn parse_runtime(raw: Option<&str>) -> Option<i32> {
    let s = raw?.trim();
    let s = s.strip_suffix("min").unwrap_or(s).trim();
    s.parse::<i32>().ok().filter(|m| *m > 0)
}

/// Leading four digits, so `"2008–2013"` → 2008.
pub fn parse_release_year(raw: &str) -> Option<i32> {
    let s = raw.trim();
    let digits: String = s.chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Value of the first rating from [`IMDB_SOURCE`], taking the part before `/`.
pub fn imdb_rating(raw: &RawLookupResult) -> Option<f64> {
    let value = raw
        .ratings
        .iter()
        .find(|r| r.source.as_deref() == Some(IMDB_SOURCE))?
        .value
        .as_deref()?;
    value.split('/').next()?.trim().parse::<f64>().ok()
}

// Empty strings and the API's "N/A" count as absent.
fn present(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("N/A"))
        .map(str::to_string)
}
