//! Library-side and catalog-side records.
//!
//! A `LibraryRecord` is what the media server knows about an item. A
//! `RatingRecord` is what one catalog source produced for it during a single
//! processing pass; it is never persisted as-is.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Read-only view of a library item, as far as matching is concerned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryRecord {
    pub title: String,

    /// Ordered author names; the first one is the primary author
    pub authors: Vec<String>,

    /// Primary catalog id (10-char alphanumeric)
    pub catalog_id: Option<String>,

    /// ISBN-like secondary identifier
    pub secondary_id: Option<String>,

    pub language: Option<String>,

    pub duration_seconds: Option<u64>,

    /// Current description, possibly with a previously rendered rating block
    pub raw_description: String,
}

impl LibraryRecord {
    /// First author, or an empty string
    pub fn primary_author(&self) -> &str {
        self.authors.first().map(String::as_str).unwrap_or("")
    }

    /// Catalog id with surrounding whitespace removed, if non-empty
    pub fn catalog_id(&self) -> Option<&str> {
        self.catalog_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Secondary id with surrounding whitespace removed, if non-empty
    pub fn secondary_id(&self) -> Option<&str> {
        self.secondary_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// How a rating record was located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Detail page fetched directly by id
    IdLookup,
    /// Free-text search redirected straight to a detail page
    TextSearchDirect,
    /// Free-text search results list, best row picked by the ranker
    TextSearchListMatch,
    /// Rating scraped from a search-results row for the id
    SearchPageFallback,
}

impl MatchMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::IdLookup => "id lookup",
            Self::TextSearchDirect => "text search (direct hit)",
            Self::TextSearchListMatch => "text search (list match)",
            Self::SearchPageFallback => "search page fallback",
        }
    }
}

/// Bibliographic metadata embedded in a primary catalog detail page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMetadata {
    #[serde(default)]
    pub publisher: Option<NamedEntry>,

    /// Usually `MM-DD-YY`
    #[serde(default)]
    pub release_date: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    /// e.g. "Unabridged Audiobook"
    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub categories: Vec<NamedEntry>,

    #[serde(default)]
    pub series: Vec<CatalogSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedEntry {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSeries {
    #[serde(default)]
    pub name: Option<String>,

    /// Free text such as "Book 3"
    #[serde(default)]
    pub part: Option<String>,
}

/// Ratings scraped from one catalog for one item
#[derive(Debug, Clone, PartialEq)]
pub struct RatingRecord {
    pub overall: Option<f64>,
    pub performance: Option<f64>,
    pub story: Option<f64>,
    pub vote_count: Option<u64>,

    /// Host the data came from (regional mirror for the primary catalog)
    pub source_domain: Option<String>,

    pub match_method: MatchMethod,

    /// ISBN (or ASIN) exposed by the matched page
    pub secondary_id_found: Option<String>,

    /// Same work on other regional mirrors: region code -> catalog id
    pub alternate_region_ids: BTreeMap<String, String>,

    pub catalog_metadata: Option<CatalogMetadata>,

    /// Detail page the record was scraped from
    pub detail_url: Option<String>,
}

impl RatingRecord {
    pub fn new(match_method: MatchMethod) -> Self {
        Self {
            overall: None,
            performance: None,
            story: None,
            vote_count: None,
            source_domain: None,
            match_method,
            secondary_id_found: None,
            alternate_region_ids: BTreeMap::new(),
            catalog_metadata: None,
            detail_url: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.source_domain = Some(domain.into());
        self
    }

    pub fn votes(&self) -> u64 {
        self.vote_count.unwrap_or(0)
    }

    /// At least one vote and a usable overall value
    pub fn has_votes(&self) -> bool {
        self.votes() > 0 && self.overall.map(|v| v > 0.0).unwrap_or(false)
    }

    /// Alternate id recorded for a region, if it differs from `current`
    pub fn alternate_id_for(&self, region_code: &str, current: Option<&str>) -> Option<&str> {
        self.alternate_region_ids
            .get(region_code)
            .map(String::as_str)
            .filter(|id| Some(*id) != current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_votes_requires_count_and_value() {
        let mut record = RatingRecord::new(MatchMethod::IdLookup);
        assert!(!record.has_votes());

        record.vote_count = Some(12);
        assert!(!record.has_votes());

        record.overall = Some(4.2);
        assert!(record.has_votes());

        record.vote_count = Some(0);
        assert!(!record.has_votes());
    }

    #[test]
    fn test_alternate_id_skips_current() {
        let mut record = RatingRecord::new(MatchMethod::IdLookup);
        record
            .alternate_region_ids
            .insert("us".to_string(), "B00ABCDEFG".to_string());

        assert_eq!(record.alternate_id_for("us", None), Some("B00ABCDEFG"));
        assert_eq!(record.alternate_id_for("us", Some("B00ABCDEFG")), None);
        assert_eq!(record.alternate_id_for("de", None), None);
    }

    #[test]
    fn test_catalog_metadata_parses_camel_case() {
        let json = r#"{
            "publisher": {"name": "Tantor"},
            "releaseDate": "03-14-21",
            "categories": [{"name": "Fantasy"}],
            "series": [{"name": "Stormlight", "part": "Book 2"}]
        }"#;
        let md: CatalogMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(md.publisher.unwrap().name.as_deref(), Some("Tantor"));
        assert_eq!(md.release_date.as_deref(), Some("03-14-21"));
        assert_eq!(md.series[0].part.as_deref(), Some("Book 2"));
        assert!(md.format.is_none());
    }

    #[test]
    fn test_library_record_ids_trimmed() {
        let record = LibraryRecord {
            catalog_id: Some("  ".to_string()),
            secondary_id: Some(" 9780261103344 ".to_string()),
            ..Default::default()
        };
        assert_eq!(record.catalog_id(), None);
        assert_eq!(record.secondary_id(), Some("9780261103344"));
    }
}
