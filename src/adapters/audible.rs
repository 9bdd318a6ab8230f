//! Primary catalog adapter (audio storefront with regional mirrors).
//!
//! Storefronts are queried in language order. Per storefront a detail page
//! ends in one of four ways: hard failure (404 / error page, next
//! storefront), soft failure (unavailable or search page, try the
//! search-page fallback first), success (return at once), or an empty
//! product page (remembered and returned only if nothing better turns up).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::extract::{
    extract_primary_search_rows, extract_search_row_rating, inspect_layers, parse_primary_page,
    ExtractionLayer, PartialRating, PrimaryPage,
};
use super::{fetch_screened, Blocked, FetchedPage, PageFetcher, PageRequest, PrimaryCatalog};
use crate::config::RegionConfig;
use crate::domain::{MatchMethod, RatingRecord};
use crate::matching::{clean_title, select_best, MatchTuning, RankTarget};

/// Markers of a product page that exists but no longer sells the title
const UNAVAILABLE_MARKERS: &[&str] = &[
    "looks like this title is no longer available",
    "titel ist leider nicht verfügbar",
    "no results for",
    "keine ergebnisse für",
];

const AGE_GATE_MARKERS: &[&str] = &["age verification", "adult content", "altersprüfung", "ab 18"];

const GEO_BLOCK_MARKERS: &[&str] = &[
    "not available in your country",
    "not available in your region",
    "in deinem land nicht verfügbar",
];

/// How a storefront answered a detail-page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// 404, server error, or redirected to an error page
    HardFailure,
    /// Unavailable marker, "no results" text or a search page
    SoftFailure,
    /// Real product page
    Product,
}

/// Classify a detail-page response.
///
/// Block statuses are screened out before this point, so any other non-2xx
/// status is a failure of this storefront only.
pub fn classify_page(page: &FetchedPage) -> PageOutcome {
    if !(200..300).contains(&page.status) || page.final_url.contains("/pderror") {
        return PageOutcome::HardFailure;
    }

    let lower = page.body.to_lowercase();
    let title = super::extract::page_title_lower(&lower);
    if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m))
        || title.contains("search")
        || page.final_url.contains("/search")
    {
        return PageOutcome::SoftFailure;
    }
    PageOutcome::Product
}

/// Diagnostic view of one storefront for one id
#[derive(Debug, Clone, PartialEq)]
pub struct RegionProbe {
    pub region: String,
    pub host: String,
    pub status: Option<u16>,
    pub final_url: Option<String>,
    pub outcome: Option<PageOutcome>,
    /// Final URL no longer mentions the requested id
    pub redirected: bool,
    pub warnings: Vec<String>,
    pub layers: Vec<(ExtractionLayer, PartialRating)>,
    pub combined: PartialRating,
    pub alternates: BTreeMap<String, String>,
    pub search_fallback: Option<PartialRating>,
}

/// Primary catalog adapter
pub struct AudibleAdapter {
    fetcher: Arc<dyn PageFetcher>,
    regions: Vec<RegionConfig>,
    tuning: MatchTuning,
}

impl AudibleAdapter {
    pub fn new(fetcher: Arc<dyn PageFetcher>, regions: Vec<RegionConfig>, tuning: MatchTuning) -> Self {
        Self {
            fetcher,
            regions,
            tuning,
        }
    }

    /// Storefronts in query order: the language's home storefront first
    pub fn ordered_regions(&self, language: Option<&str>) -> Vec<&RegionConfig> {
        let home = self.home_index(language);
        let mut ordered: Vec<&RegionConfig> = Vec::with_capacity(self.regions.len());
        if let Some(region) = self.regions.get(home) {
            ordered.push(region);
        }
        ordered.extend(
            self.regions
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != home)
                .map(|(_, region)| region),
        );
        ordered
    }

    fn home_index(&self, language: Option<&str>) -> usize {
        language
            .and_then(|lang| self.regions.iter().position(|r| r.serves_language(lang)))
            .unwrap_or(0)
    }

    fn detail_request(region: &RegionConfig, id: &str) -> PageRequest {
        PageRequest::get(format!("{}/pd/{}", region.base_url(), id))
            .param("ipRedirectOverride", "true")
            .for_region(region)
    }

    fn search_request(region: &RegionConfig) -> PageRequest {
        PageRequest::get(format!("{}/search", region.base_url())).for_region(region)
    }

    /// Rating from the search-results row of `id` on one storefront
    pub async fn search_page_fallback(
        &self,
        region: &RegionConfig,
        id: &str,
    ) -> Result<Option<RatingRecord>, Blocked> {
        info!(host = %region.host, "Attempting search page fallback");
        let request = Self::search_request(region)
            .param("keywords", id)
            .param("ipRedirectOverride", "true");
        let Some(page) = fetch_screened(self.fetcher.as_ref(), &request).await? else {
            return Ok(None);
        };

        Ok(extract_search_row_rating(&page.body, id).map(|found| {
            let mut record = RatingRecord::new(MatchMethod::SearchPageFallback).with_domain(&region.host);
            record.overall = found.overall;
            record.vote_count = found.count;
            record
        }))
    }

    fn record_from_page(region: &RegionConfig, page: &FetchedPage, parsed: PrimaryPage) -> RatingRecord {
        let mut record = RatingRecord::new(MatchMethod::IdLookup).with_domain(&region.host);
        record.overall = parsed.ratings.overall;
        record.performance = parsed.ratings.performance;
        record.story = parsed.ratings.story;
        record.vote_count = Some(parsed.ratings.count.unwrap_or(0));
        record.alternate_region_ids = parsed.alternates;
        record.catalog_metadata = parsed.metadata;
        record.detail_url = Some(page.final_url.clone());
        record
    }

    /// Run every extraction layer for `id` on every storefront
    pub async fn probe(&self, id: &str) -> Result<Vec<RegionProbe>, Blocked> {
        let mut probes = Vec::with_capacity(self.regions.len());

        for region in &self.regions {
            let mut probe = RegionProbe {
                region: region.code.clone(),
                host: region.host.clone(),
                status: None,
                final_url: None,
                outcome: None,
                redirected: false,
                warnings: Vec::new(),
                layers: Vec::new(),
                combined: PartialRating::default(),
                alternates: BTreeMap::new(),
                search_fallback: None,
            };

            if let Some(page) = fetch_screened(self.fetcher.as_ref(), &Self::detail_request(region, id)).await? {
                let lower = page.body.to_lowercase();
                probe.status = Some(page.status);
                probe.redirected = !page.final_url.contains(id);
                probe.outcome = Some(classify_page(&page));
                if AGE_GATE_MARKERS.iter().any(|m| lower.contains(m)) {
                    probe.warnings.push("age restriction page".to_string());
                }
                if GEO_BLOCK_MARKERS.iter().any(|m| lower.contains(m)) {
                    probe.warnings.push("geo restriction notice".to_string());
                }
                probe.layers = inspect_layers(&page.body);
                let parsed = parse_primary_page(&page.body, &self.regions);
                probe.combined = parsed.ratings;
                probe.alternates = parsed.alternates;
                probe.final_url = Some(page.final_url);
            }

            probe.search_fallback = self.search_page_fallback(region, id).await?.map(|r| PartialRating {
                overall: r.overall,
                count: r.vote_count,
                ..Default::default()
            });
            probes.push(probe);
        }

        Ok(probes)
    }
}

#[async_trait]
impl PrimaryCatalog for AudibleAdapter {
    fn name(&self) -> &str {
        "audible"
    }

    fn home_region(&self, language: Option<&str>) -> Option<&RegionConfig> {
        self.regions.get(self.home_index(language))
    }

    #[instrument(skip(self), fields(catalog = "audible"))]
    async fn fetch_by_id(
        &self,
        id: &str,
        language: Option<&str>,
    ) -> Result<Option<RatingRecord>, Blocked> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }

        let mut empty_result: Option<RatingRecord> = None;

        for region in self.ordered_regions(language) {
            info!(host = %region.host, "Checking storefront");
            let Some(page) = fetch_screened(self.fetcher.as_ref(), &Self::detail_request(region, id)).await?
            else {
                continue;
            };

            match classify_page(&page) {
                PageOutcome::HardFailure => {
                    info!(host = %region.host, status = page.status, "Not found on storefront");
                    continue;
                }
                PageOutcome::SoftFailure => {
                    info!(host = %region.host, "Title unavailable or search page returned");
                    if let Some(found) = self.search_page_fallback(region, id).await? {
                        info!(host = %region.host, votes = found.votes(), "Found via search page fallback");
                        return Ok(Some(found));
                    }
                    continue;
                }
                PageOutcome::Product => {}
            }

            let parsed = parse_primary_page(&page.body, &self.regions);
            let record = Self::record_from_page(region, &page, parsed);

            if record.has_votes() {
                info!(
                    host = %region.host,
                    votes = record.votes(),
                    rating = record.overall.unwrap_or(0.0),
                    "Ratings found"
                );
                return Ok(Some(record));
            }

            info!(host = %region.host, "Product page has no usable rating");
            if let Some(mut found) = self.search_page_fallback(region, id).await? {
                info!(host = %region.host, votes = found.votes(), "Found via search page fallback");
                found.alternate_region_ids = record.alternate_region_ids;
                found.catalog_metadata = record.catalog_metadata;
                return Ok(Some(found));
            }
            if empty_result.is_none() {
                empty_result = Some(record);
            }
        }

        Ok(empty_result)
    }

    #[instrument(skip(self, authors), fields(catalog = "audible"))]
    async fn search_by_text(
        &self,
        title: &str,
        authors: &[String],
        duration_seconds: Option<u64>,
        language: Option<&str>,
    ) -> Result<Option<String>, Blocked> {
        let query_title = clean_title(title);
        let query_title = if query_title.is_empty() {
            title.trim().to_string()
        } else {
            query_title
        };
        if query_title.is_empty() {
            return Ok(None);
        }
        let author = authors.first().map(String::as_str).unwrap_or("");
        let target = RankTarget {
            title,
            authors,
            duration_seconds,
        };

        info!(title = %query_title, "Searching for replacement catalog id");

        for region in self.ordered_regions(language) {
            let mut strategies = vec![author];
            if !author.is_empty() {
                strategies.push("");
            }

            for author_query in strategies {
                let request = Self::search_request(region)
                    .param("title", query_title.as_str())
                    .param("author_author", author_query)
                    .param("ipRedirectOverride", "true");
                let Some(page) = fetch_screened(self.fetcher.as_ref(), &request).await? else {
                    continue;
                };

                let rows = extract_primary_search_rows(&page.body);
                debug!(host = %region.host, rows = rows.len(), "Search results parsed");
                if let Some(best) = select_best(&rows, &target, self.tuning.primary_accept, &self.tuning) {
                    info!(
                        host = %region.host,
                        id = %best.external_id,
                        score = best.score.combined_score,
                        "Search match"
                    );
                    return Ok(Some(best.external_id));
                }
            }
        }

        info!("No search match");
        Ok(None)
    }
}
