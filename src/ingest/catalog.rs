// src/ingest/catalog.rs
use std::path::Path;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::error::ConfigurationFailure;
use crate::ingest::types::CatalogEntry;

pub const DEFAULT_TITLE_COLUMN: &str = "title";

/// Split `"<name> (<4-digit year>)"` into title and year.
/// Anything else keeps the trimmed text as the title and carries no year.
pub fn parse_title_year(raw: &str) -> CatalogEntry {
    static RE_TITLE_YEAR: OnceCell<Regex> = OnceCell::new();
    let re = RE_TITLE_YEAR.get_or_init(|| {
        Regex::new(r"^(.*)\s+\((\d{4})\)$").expect("title/year regex")
    });

    let trimmed = raw.trim();
    match re.captures(trimmed) {
        Some(caps) => CatalogEntry {
            title: caps[1].trim().to_string(),
            year: Some(caps[2].to_string()),
        },
        None => CatalogEntry {
            title: trimmed.to_string(),
            year: None,
        },
    }
}

/// Read the catalog CSV at `path`, taking entries from the header column `column`.
/// Row order is preserved; the checkpoint index is positional.
pub fn read_catalog(path: &Path, column: &str) -> Result<Vec<CatalogEntry>, ConfigurationFailure> {
    let fail = |reason: String| ConfigurationFailure::Catalog {
        path: path.to_path_buf(),
        reason,
    };
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| fail(e.to_string()))?;
    read_catalog_from(rdr, column).map_err(fail)
}

/// Same as [`read_catalog`] over any reader (used by tests and in-memory sources).
pub fn read_catalog_from_reader<R: std::io::Read>(
    reader: R,
    column: &str,
) -> Result<Vec<CatalogEntry>, String> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    read_catalog_from(rdr, column)
}

fn read_catalog_from<R: std::io::Read>(
    mut rdr: csv::Reader<R>,
    column: &str,
) -> Result<Vec<CatalogEntry>, String> {
    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
    let idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| format!("no column named {column:?}"))?;

    let mut out = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| format!("row {}: {e}", row + 1))?;
        let cell = record.get(idx).unwrap_or_default();
        out.push(parse_title_year(cell));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_title_and_year() {
        let e = parse_title_year("Inception (2010)");
        assert_eq!(e.title, "Inception");
        assert_eq!(e.year.as_deref(), Some("2010"));
    }

    #[test]
    fn keeps_inner_parentheses_in_title() {
        let e = parse_title_year("City of Lost Children, The (Cité des enfants perdus, La) (1995)");
        assert_eq!(e.title, "City of Lost Children, The (Cité des enfants perdus, La)");
        assert_eq!(e.year.as_deref(), Some("1995"));
    }

    #[test]
    fn no_year_keeps_title() {
        let e = parse_title_year("Untitled");
        assert_eq!(e.title, "Untitled");
        assert!(e.year.is_none());

        // Not a 4-digit year.
        let e = parse_title_year("Babylon 5 (93)");
        assert_eq!(e.title, "Babylon 5 (93)");
        assert!(e.year.is_none());
    }

    #[test]
    fn reads_quoted_rows_in_order() {
        let csv = "movieId,title,genres\n\
                   1,Toy Story (1995),Animation\n\
                   2,\"American President, The (1995)\",Comedy\n\
                   3,Untitled,Drama\n";
        let out = read_catalog_from_reader(csv.as_bytes(), "title").unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].title, "Toy Story");
        assert_eq!(out[1].title, "American President, The");
        assert_eq!(out[1].year.as_deref(), Some("1995"));
        assert!(out[2].year.is_none());
    }

    #[test]
    fn missing_column_is_an_error() {
        let csv = "movieId,name\n1,Heat (1995)\n";
        assert!(read_catalog_from_reader(csv.as_bytes(), "title").is_err());
    }
}
