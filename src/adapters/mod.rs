//! Adapter interfaces for external systems.
//!
//! Adapters wrap the media server and the two catalog sites behind traits so
//! the orchestrator can be driven by in-memory fakes. Catalog adapters sit on
//! top of a [`PageFetcher`], which is the only place HTTP happens.

pub mod audible;
pub mod audiobookshelf;
pub mod extract;
pub mod goodreads;
pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::RegionConfig;
use crate::domain::{ItemSummary, LibraryItem, LibraryRecord, MetadataPatch, RatingRecord};

pub use audible::AudibleAdapter;
pub use audiobookshelf::AudiobookshelfClient;
pub use goodreads::GoodreadsAdapter;
pub use http::HttpFetcher;

/// Rate-limit or bot-check signal from a catalog site.
///
/// Hard signals abort the run; soft ones pause and retry the current item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Blocked {
    pub reason: String,
    pub hard: bool,
}

impl Blocked {
    pub fn hard(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            hard: true,
        }
    }

    pub fn soft(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            hard: false,
        }
    }
}

/// Failure of a single page fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("blocked: {0}")]
    Blocked(#[from] Blocked),

    /// Timeout, connection error, unreadable body
    #[error("transport error: {0}")]
    Transport(String),
}

/// A GET request for one catalog page
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub accept_language: Option<String>,
    pub cookie: Option<String>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            accept_language: None,
            cookie: None,
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Request shaped for one regional storefront
    pub fn for_region(mut self, region: &RegionConfig) -> Self {
        self.accept_language = Some(region.accept_language.clone());
        self.cookie = Some(format!("audible_site_preference={}", region.site_preference));
        self
    }

    /// URL with the query string encoded
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        match reqwest::Url::parse_with_params(&self.url, &self.query) {
            Ok(url) => url.to_string(),
            Err(_) => self.url.clone(),
        }
    }
}

/// A fetched page after redirects
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub status: u16,
    pub final_url: String,
    pub body: String,
}

/// Fetches catalog pages; the HTTP implementation lives in [`http`]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage, FetchError>;
}

/// Phrases of bot-check interstitials
const BOT_CHECK_PHRASES: &[&str] = &[
    "captcha",
    "robot check",
    "are you a robot",
    "not a robot",
    "unusual traffic",
];

/// Bot-check pages are small; product pages are far larger than this
const BOT_CHECK_MAX_BYTES: usize = 15_000;

/// Classify a fetched page as a block signal, if it is one
pub fn screen_for_block(page: &FetchedPage) -> Option<Blocked> {
    match page.status {
        429 => return Some(Blocked::hard("HTTP 429")),
        403 | 503 => return Some(Blocked::soft(format!("HTTP {}", page.status))),
        _ => {}
    }

    let lower = page.body.to_lowercase();
    let title = extract::page_title_lower(&lower);
    if BOT_CHECK_PHRASES.iter().any(|p| title.contains(p)) {
        return Some(Blocked::soft("bot check page (title)"));
    }
    if page.body.len() < BOT_CHECK_MAX_BYTES && BOT_CHECK_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(Blocked::soft("bot check page (body)"));
    }
    None
}

/// Fetch and screen a page.
///
/// Transport failures become `Ok(None)` ("no data from this source"); block
/// signals are returned as errors so they reach the orchestrator.
pub async fn fetch_screened(
    fetcher: &dyn PageFetcher,
    request: &PageRequest,
) -> Result<Option<FetchedPage>, Blocked> {
    match fetcher.fetch(request).await {
        Ok(page) => match screen_for_block(&page) {
            Some(blocked) => Err(blocked),
            None => Ok(Some(page)),
        },
        Err(FetchError::Blocked(blocked)) => Err(blocked),
        Err(FetchError::Transport(e)) => {
            warn!(url = %request.full_url(), error = %e, "Request failed");
            Ok(None)
        }
    }
}

/// The media server holding the library
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    fn name(&self) -> &str;

    /// Connectivity check
    async fn ping(&self) -> Result<()>;

    async fn list_items(&self, library_id: &str) -> Result<Vec<ItemSummary>>;

    async fn get_item(&self, item_id: &str) -> Result<LibraryItem>;

    /// Shallow-merge the given fields into the item's metadata
    async fn patch_metadata(&self, item_id: &str, patch: &MetadataPatch) -> Result<()>;
}

/// The audio catalog with regional storefronts
#[async_trait]
pub trait PrimaryCatalog: Send + Sync {
    fn name(&self) -> &str;

    /// Storefront an item of this language belongs to
    fn home_region(&self, language: Option<&str>) -> Option<&RegionConfig>;

    /// Ratings for a catalog id, trying storefronts in language order.
    /// `Ok(None)` means no storefront knows the id.
    async fn fetch_by_id(
        &self,
        id: &str,
        language: Option<&str>,
    ) -> Result<Option<RatingRecord>, Blocked>;

    /// Catalog id of the best text-search match, if any
    async fn search_by_text(
        &self,
        title: &str,
        authors: &[String],
        duration_seconds: Option<u64>,
        language: Option<&str>,
    ) -> Result<Option<String>, Blocked>;
}

/// The book catalog
#[async_trait]
pub trait SecondaryCatalog: Send + Sync {
    fn name(&self) -> &str;

    /// Search for an identifier; only a direct hit on a detail page counts
    async fn search_by_id(&self, id: &str) -> Result<Option<RatingRecord>, Blocked>;

    async fn search_by_text(
        &self,
        title: &str,
        authors: &[String],
        duration_seconds: Option<u64>,
    ) -> Result<Option<RatingRecord>, Blocked>;

    /// Secondary id, then primary id, then text search
    async fn lookup(
        &self,
        record: &LibraryRecord,
        primary_id: Option<&str>,
    ) -> Result<Option<RatingRecord>, Blocked> {
        for id in [record.secondary_id(), primary_id].into_iter().flatten() {
            if let Some(found) = self.search_by_id(id).await? {
                return Ok(Some(found));
            }
        }

        if record.title.trim().is_empty() {
            return Ok(None);
        }
        self.search_by_text(&record.title, &record.authors, record.duration_seconds)
            .await
    }
}
