//! Media-server items and the partial metadata updates sent back to them.

use serde::{Deserialize, Serialize};

use super::record::LibraryRecord;

/// Entry of a library listing
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSummary {
    pub id: String,
    pub title: Option<String>,
}

/// Series membership as the media server stores it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub name: String,

    #[serde(default)]
    pub sequence: Option<String>,
}

/// Metadata fields that catalog sync may overwrite
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentMetadata {
    pub publisher: Option<String>,
    pub published_year: Option<String>,
    pub abridged: Option<bool>,
    pub genres: Vec<String>,
    pub series: Vec<SeriesEntry>,
}

/// A fully fetched library item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryItem {
    pub id: String,
    pub record: LibraryRecord,
    pub current: CurrentMetadata,
}

/// Shallow metadata update; only `Some` fields are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_year: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub abridged: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<SeriesEntry>>,
}

impl MetadataPatch {
    pub fn description(text: impl Into<String>) -> Self {
        Self {
            description: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn asin(id: impl Into<String>) -> Self {
        Self {
            asin: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn isbn(id: impl Into<String>) -> Self {
        Self {
            isbn: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
