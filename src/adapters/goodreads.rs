//! Secondary catalog adapter (book catalog).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::extract::{extract_secondary_details, extract_secondary_search_rows};
use super::{fetch_screened, Blocked, FetchedPage, PageFetcher, PageRequest, SecondaryCatalog};
use crate::domain::{MatchMethod, RatingRecord};
use crate::matching::{clean_title, select_best, MatchTuning, RankTarget};

const DETAIL_PATH: &str = "/book/show/";

/// Secondary catalog adapter
pub struct GoodreadsAdapter {
    fetcher: Arc<dyn PageFetcher>,
    base_url: String,
    tuning: MatchTuning,
}

impl GoodreadsAdapter {
    pub fn new(fetcher: Arc<dyn PageFetcher>, base_url: impl Into<String>, tuning: MatchTuning) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tuning,
        }
    }

    fn host(&self) -> String {
        self.base_url
            .split("://")
            .nth(1)
            .unwrap_or(&self.base_url)
            .to_string()
    }

    fn search_request(&self, query: &str) -> PageRequest {
        PageRequest::get(format!("{}/search", self.base_url)).param("q", query)
    }

    /// Rating record from a detail page, if it carries an overall value
    fn record_from_detail(&self, page: &FetchedPage, method: MatchMethod) -> Option<RatingRecord> {
        let details = extract_secondary_details(&page.body);
        let overall = details.overall?;

        let mut record = RatingRecord::new(method).with_domain(self.host());
        record.overall = Some(overall);
        record.vote_count = details.count;
        record.secondary_id_found = details.isbn.or(details.asin);
        record.detail_url = Some(page.final_url.clone());
        Some(record)
    }

    async fn fetch_detail(&self, url: &str, method: MatchMethod) -> Result<Option<RatingRecord>, Blocked> {
        let page = fetch_screened(self.fetcher.as_ref(), &PageRequest::get(url)).await?;
        Ok(page.and_then(|page| self.record_from_detail(&page, method)))
    }

    /// Distinct non-empty queries, most specific first
    fn text_queries(title: &str, primary_author: &str) -> Vec<String> {
        let title = title.trim();
        let cleaned = clean_title(title);
        let with_author = |t: &str| format!("{} {}", t, primary_author).trim().to_string();

        let mut queries = Vec::new();
        for query in [
            with_author(title),
            with_author(&cleaned),
            title.to_string(),
            cleaned.clone(),
        ] {
            if !query.is_empty() && !queries.contains(&query) {
                queries.push(query);
            }
        }
        queries
    }
}

#[async_trait]
impl SecondaryCatalog for GoodreadsAdapter {
    fn name(&self) -> &str {
        "goodreads"
    }

    #[instrument(skip(self), fields(catalog = "goodreads"))]
    async fn search_by_id(&self, id: &str) -> Result<Option<RatingRecord>, Blocked> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }

        let Some(page) = fetch_screened(self.fetcher.as_ref(), &self.search_request(id)).await? else {
            return Ok(None);
        };
        if !page.final_url.contains(DETAIL_PATH) {
            debug!("Identifier search did not resolve to a detail page");
            return Ok(None);
        }

        let record = self.record_from_detail(&page, MatchMethod::IdLookup);
        if let Some(found) = &record {
            info!(votes = found.votes(), rating = found.overall.unwrap_or(0.0), "Found via identifier");
        }
        Ok(record)
    }

    #[instrument(skip(self, authors), fields(catalog = "goodreads"))]
    async fn search_by_text(
        &self,
        title: &str,
        authors: &[String],
        duration_seconds: Option<u64>,
    ) -> Result<Option<RatingRecord>, Blocked> {
        let primary_author = authors.first().map(String::as_str).unwrap_or("");
        let target = RankTarget {
            title,
            authors,
            duration_seconds,
        };

        for query in Self::text_queries(title, primary_author) {
            let Some(page) = fetch_screened(self.fetcher.as_ref(), &self.search_request(&query)).await? else {
                continue;
            };

            if page.final_url.contains(DETAIL_PATH) {
                if let Some(found) = self.record_from_detail(&page, MatchMethod::TextSearchDirect) {
                    info!(query = %query, votes = found.votes(), "Found via text search (direct hit)");
                    return Ok(Some(found));
                }
                continue;
            }

            let rows = extract_secondary_search_rows(&page.body, &self.base_url);
            debug!(query = %query, rows = rows.len(), "Search results parsed");
            let Some(best) = select_best(&rows, &target, self.tuning.secondary_accept, &self.tuning) else {
                continue;
            };

            if let Some(found) = self
                .fetch_detail(&best.external_id, MatchMethod::TextSearchListMatch)
                .await?
            {
                info!(
                    query = %query,
                    score = best.score.combined_score,
                    votes = found.votes(),
                    "Found via text search (list match)"
                );
                return Ok(Some(found));
            }
        }

        info!("Not found via identifier or text");
        Ok(None)
    }
}
