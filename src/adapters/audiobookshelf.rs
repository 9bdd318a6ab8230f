//! Audiobookshelf REST API client.
//!
//! Only the four calls the enrichment run needs: list libraries (as a
//! connection check), list a library's items, fetch one item, and patch an
//! item's metadata.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::MediaLibrary;
use crate::domain::{CurrentMetadata, ItemSummary, LibraryItem, LibraryRecord, MetadataPatch, SeriesEntry};

/// Audiobookshelf API client
pub struct AudiobookshelfClient {
    /// Server base URL, without trailing slash
    base_url: String,
    /// API token sent as bearer auth
    token: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response of `GET /api/libraries/{id}/items`
#[derive(Debug, Deserialize)]
struct ItemsPage {
    #[serde(default)]
    results: Vec<RawItem>,
}

/// Item as the server returns it; listing entries carry a subset
#[derive(Debug, Deserialize)]
struct RawItem {
    id: String,
    #[serde(default)]
    media: RawMedia,
}

#[derive(Debug, Default, Deserialize)]
struct RawMedia {
    #[serde(default)]
    metadata: RawMetadata,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<RawAuthor>,
    author_name: Option<String>,
    asin: Option<String>,
    isbn: Option<String>,
    language: Option<String>,
    description: Option<String>,
    publisher: Option<String>,
    published_year: Option<Value>,
    abridged: Option<bool>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    series: Vec<SeriesEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAuthor {
    Named { name: String },
    Plain(String),
}

impl RawAuthor {
    fn name(&self) -> &str {
        match self {
            RawAuthor::Named { name } => name,
            RawAuthor::Plain(name) => name,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RawItem {
    fn into_library_item(self) -> LibraryItem {
        let meta = self.media.metadata;

        let mut authors: Vec<String> = meta
            .authors
            .iter()
            .map(|a| a.name().trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if authors.is_empty() {
            if let Some(joined) = non_empty(meta.author_name) {
                authors = joined
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
            }
        }

        let published_year = match meta.published_year {
            Some(Value::String(year)) => non_empty(Some(year)),
            Some(Value::Number(year)) => Some(year.to_string()),
            _ => None,
        };

        LibraryItem {
            id: self.id,
            record: LibraryRecord {
                title: meta.title.unwrap_or_default().trim().to_string(),
                authors,
                catalog_id: non_empty(meta.asin),
                secondary_id: non_empty(meta.isbn),
                language: non_empty(meta.language),
                duration_seconds: self
                    .media
                    .duration
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .map(|d| d.round() as u64),
                raw_description: meta.description.unwrap_or_default(),
            },
            current: CurrentMetadata {
                publisher: non_empty(meta.publisher),
                published_year,
                abridged: meta.abridged,
                genres: meta.genres,
                series: meta.series,
            },
        }
    }
}

impl AudiobookshelfClient {
    /// Create a new client
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.api_url(path);
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to reach media server at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Media server returned {} for {}", status, path);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse media server response for {}", path))
    }
}

#[async_trait]
impl MediaLibrary for AudiobookshelfClient {
    fn name(&self) -> &str {
        "audiobookshelf"
    }

    async fn ping(&self) -> Result<()> {
        let _: Value = self.get_json("libraries").await?;
        Ok(())
    }

    async fn list_items(&self, library_id: &str) -> Result<Vec<ItemSummary>> {
        let page: ItemsPage = self
            .get_json(&format!("libraries/{}/items", library_id))
            .await?;

        Ok(page
            .results
            .into_iter()
            .map(|raw| ItemSummary {
                title: non_empty(raw.media.metadata.title),
                id: raw.id,
            })
            .collect())
    }

    async fn get_item(&self, item_id: &str) -> Result<LibraryItem> {
        let raw: RawItem = self.get_json(&format!("items/{}", item_id)).await?;
        Ok(raw.into_library_item())
    }

    async fn patch_metadata(&self, item_id: &str, patch: &MetadataPatch) -> Result<()> {
        let url = self.api_url(&format!("items/{}/media", item_id));

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "metadata": patch }))
            .send()
            .await
            .context("Failed to send metadata update")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Metadata update for {} failed ({}): {}", item_id, status, body.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_parsing() {
        let raw: RawItem = serde_json::from_value(serde_json::json!({
            "id": "li_1",
            "media": {
                "duration": 37812.4,
                "metadata": {
                    "title": " The Hobbit ",
                    "authors": [{"id": "au_1", "name": "J.R.R. Tolkien"}],
                    "asin": "B0HOBBIT01",
                    "isbn": "",
                    "language": "English",
                    "description": "There and back again.",
                    "publishedYear": 2012,
                    "genres": ["Fantasy"],
                    "series": [{"id": "se_1", "name": "Middle-earth", "sequence": "1"}]
                }
            }
        }))
        .unwrap();

        let item = raw.into_library_item();
        assert_eq!(item.record.title, "The Hobbit");
        assert_eq!(item.record.authors, vec!["J.R.R. Tolkien"]);
        assert_eq!(item.record.catalog_id.as_deref(), Some("B0HOBBIT01"));
        assert_eq!(item.record.secondary_id, None);
        assert_eq!(item.record.duration_seconds, Some(37812));
        assert_eq!(item.current.published_year.as_deref(), Some("2012"));
        assert_eq!(item.current.series[0].sequence.as_deref(), Some("1"));
    }

    #[test]
    fn test_author_name_fallback() {
        let raw: RawItem = serde_json::from_value(serde_json::json!({
            "id": "li_2",
            "media": {"metadata": {"title": "Good Omens", "authorName": "Terry Pratchett, Neil Gaiman"}}
        }))
        .unwrap();

        let item = raw.into_library_item();
        assert_eq!(item.record.authors, vec!["Terry Pratchett", "Neil Gaiman"]);
        assert_eq!(item.record.duration_seconds, None);
        assert_eq!(item.record.raw_description, "");
    }

    #[test]
    fn test_api_url() {
        let client = AudiobookshelfClient::new("http://abs.local:13378/", "token", Duration::from_secs(5)).unwrap();
        assert_eq!(client.api_url("libraries"), "http://abs.local:13378/api/libraries");
    }
}
