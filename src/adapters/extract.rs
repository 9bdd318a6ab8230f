//! HTML and embedded-JSON extraction for catalog pages.
//!
//! Everything here is synchronous and works on owned strings; parsed
//! documents never outlive the function that built them.
//!
//! Ratings on a primary detail page are pulled through ordered layers
//! (see [`ExtractionLayer`]). Each layer only fills fields the previous ones
//! left empty, and extraction stops once both the overall value and the vote
//! count are known.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::config::RegionConfig;
use crate::domain::CatalogMetadata;
use crate::matching::CandidateEntry;

/// Nesting bound for the page-state tree walk
const MAX_JSON_DEPTH: usize = 12;

static STORY_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"story-value="([0-9.,]+)""#).expect("story regex should compile"));

static PERFORMANCE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"performance-value="([0-9.,]+)""#).expect("performance regex should compile")
});

// The leading class keeps `story-value=` and `performance-value=` out
static OVERALL_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^-\w])value="([0-9.,]+)""#).expect("overall regex should compile")
});

static COUNT_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|[^-\w])count="(\d+)""#).expect("count regex should compile"));

static FIRST_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+[.,]?\d*)").expect("decimal regex should compile"));

static FIRST_GROUPED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d,.]+)").expect("grouped number regex should compile"));

static RUNTIME_HOURS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:Std|hr|h)").expect("hours regex should compile"));

static RUNTIME_MINUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:Min|m)").expect("minutes regex should compile"));

static CATALOG_ID_IN_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/([A-Z0-9]{10})(?:[/?#]|$)").expect("catalog id regex should compile")
});

static AVG_RATING_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+[.,]\d+)\s+avg rating").expect("avg rating regex should compile")
});

static RATINGS_COUNT_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d,.]+)\s+ratings").expect("ratings regex should compile"));

static ISBN_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""isbn"\s*:\s*"([0-9]{10,13})""#).expect("isbn regex should compile")
});

static ASIN_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""asin"\s*:\s*"([A-Z0-9]{10})""#).expect("asin regex should compile")
});

static ASIN_URL_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:creativeASIN|asin)=([A-Z0-9]{10})").expect("asin param regex should compile")
});

static ASIN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ASIN[:\s]*(B0[A-Z0-9]{8})").expect("asin text regex should compile")
});

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text between `<title ...>` and `</title>` of an already-lowercased page
pub fn page_title_lower(lower_html: &str) -> &str {
    let Some(open) = lower_html.find("<title") else {
        return "";
    };
    let rest = &lower_html[open..];
    let Some(start) = rest.find('>') else {
        return "";
    };
    let rest = &rest[start + 1..];
    match rest.find("</title>") {
        Some(end) => rest[..end].trim(),
        None => "",
    }
}

/// Decimal-comma tolerant rating, valid only in (0, 5]
pub fn parse_rating(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().replace(',', ".").parse().ok()?;
    (value > 0.0 && value <= 5.0).then_some(value)
}

/// Digits of a grouped number such as "120,000"
pub fn parse_count(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn json_rating(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| *v > 0.0 && *v <= 5.0),
        Value::String(s) => parse_rating(s),
        _ => None,
    }
}

fn json_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => parse_count(s),
        _ => None,
    }
}

/// Rating fields gathered so far
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialRating {
    pub overall: Option<f64>,
    pub performance: Option<f64>,
    pub story: Option<f64>,
    pub count: Option<u64>,
}

impl PartialRating {
    /// Overall value and vote count both known
    pub fn is_complete(&self) -> bool {
        self.overall.is_some() && self.count.is_some()
    }

    /// At least one vote and a usable overall value
    pub fn has_votes(&self) -> bool {
        self.count.unwrap_or(0) > 0 && self.overall.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fill fields that are still empty from `other`
    pub fn fill_from(&mut self, other: &PartialRating) {
        self.overall = self.overall.or(other.overall);
        self.performance = self.performance.or(other.performance);
        self.story = self.story.or(other.story);
        self.count = self.count.or(other.count);
    }
}

/// Rating sources on a primary detail page, in consultation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionLayer {
    /// `<adbl-rating-summary>` / `<adbl-star-rating>` attributes
    Widget,
    /// schema.org `aggregateRating` in ld+json blocks
    LinkedData,
    /// `{value, count}` object somewhere inside page-state JSON
    PageState,
    /// `key="value"` patterns in the raw markup
    RawText,
}

impl ExtractionLayer {
    pub const ALL: [ExtractionLayer; 4] = [
        ExtractionLayer::Widget,
        ExtractionLayer::LinkedData,
        ExtractionLayer::PageState,
        ExtractionLayer::RawText,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Widget => "rating widget",
            Self::LinkedData => "linked data",
            Self::PageState => "page state json",
            Self::RawText => "raw text",
        }
    }
}

/// Run a single layer in isolation
pub fn run_layer(layer: ExtractionLayer, doc: &Html, raw_html: &str) -> PartialRating {
    match layer {
        ExtractionLayer::Widget => widget_layer(doc),
        ExtractionLayer::LinkedData => linked_data_layer(doc),
        ExtractionLayer::PageState => page_state_layer(doc),
        ExtractionLayer::RawText => raw_text_layer(raw_html),
    }
}

/// Layered rating extraction for a primary detail page
pub fn extract_ratings(doc: &Html, raw_html: &str) -> PartialRating {
    let mut acc = PartialRating::default();
    for layer in ExtractionLayer::ALL {
        if acc.is_complete() {
            break;
        }
        acc.fill_from(&run_layer(layer, doc, raw_html));
    }
    acc
}

fn widget_layer(doc: &Html) -> PartialRating {
    let mut found = PartialRating::default();
    let (Some(summary_sel), Some(star_sel)) =
        (selector("adbl-rating-summary"), selector("adbl-star-rating"))
    else {
        return found;
    };

    let Some(summary) = doc.select(&summary_sel).next() else {
        return found;
    };
    found.performance = summary.value().attr("performance-value").and_then(parse_rating);
    found.story = summary.value().attr("story-value").and_then(parse_rating);

    if let Some(star) = summary.select(&star_sel).next() {
        found.overall = star.value().attr("value").and_then(parse_rating);
        found.count = star.value().attr("count").and_then(parse_count);
    }
    found
}

/// All objects of all ld+json blocks; arrays and `@graph` are flattened
pub fn linked_data_objects(doc: &Html) -> Vec<Value> {
    let Some(sel) = selector(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    let mut objects = Vec::new();
    for script in doc.select(&sel) {
        let text: String = script.text().collect();
        let Ok(parsed) = serde_json::from_str::<Value>(text.trim()) else {
            continue;
        };
        let mut pending = vec![parsed];
        while let Some(value) = pending.pop() {
            match value {
                Value::Array(items) => pending.extend(items.into_iter().rev()),
                Value::Object(mut map) => {
                    if let Some(graph) = map.remove("@graph") {
                        pending.push(graph);
                    }
                    objects.push(Value::Object(map));
                }
                _ => {}
            }
        }
    }
    objects
}

/// `aggregateRating` of the first linked-data object carrying one
fn aggregate_rating(objects: &[Value]) -> PartialRating {
    let mut found = PartialRating::default();
    for object in objects {
        let Some(aggregate) = object.get("aggregateRating") else {
            continue;
        };
        found.overall = aggregate.get("ratingValue").and_then(json_rating);
        found.count = aggregate
            .get("ratingCount")
            .and_then(json_count)
            .or_else(|| aggregate.get("reviewCount").and_then(json_count));
        if found.overall.is_some() {
            break;
        }
    }
    found
}

fn linked_data_layer(doc: &Html) -> PartialRating {
    aggregate_rating(&linked_data_objects(doc))
}

/// Parsed page-state blobs (`application/json` scripts and `__NEXT_DATA__`)
fn page_state_blobs(doc: &Html) -> Vec<Value> {
    let Some(sel) = selector(r#"script[type="application/json"], script#__NEXT_DATA__"#) else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|script| {
            let text: String = script.text().collect();
            serde_json::from_str::<Value>(text.trim()).ok()
        })
        .collect()
}

fn page_state_layer(doc: &Html) -> PartialRating {
    page_state_blobs(doc)
        .iter()
        .find_map(|blob| find_rating_object(blob, 0))
        .unwrap_or_default()
}

/// Depth-bounded search for a rating-shaped object.
///
/// Accepts either `{"rating": {"value": v, "count": n}}` or an object that
/// itself carries a valid `value` next to a `count`.
pub fn find_rating_object(value: &Value, depth: usize) -> Option<PartialRating> {
    if depth > MAX_JSON_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => {
            if let Some(rating) = map.get("rating").filter(|r| r.is_object()) {
                if let Some(overall) = rating.get("value").and_then(json_rating) {
                    return Some(PartialRating {
                        overall: Some(overall),
                        count: rating.get("count").and_then(json_count),
                        ..Default::default()
                    });
                }
            }

            if let (Some(overall), Some(count)) = (
                map.get("value").and_then(json_rating),
                map.get("count").and_then(json_count),
            ) {
                return Some(PartialRating {
                    overall: Some(overall),
                    count: Some(count),
                    ..Default::default()
                });
            }

            map.values().find_map(|child| find_rating_object(child, depth + 1))
        }
        Value::Array(items) => items
            .iter()
            .find_map(|child| find_rating_object(child, depth + 1)),
        _ => None,
    }
}

fn raw_text_layer(raw_html: &str) -> PartialRating {
    let capture = |re: &Regex| {
        re.captures(raw_html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    };

    PartialRating {
        overall: capture(&OVERALL_ATTR).as_deref().and_then(parse_rating),
        performance: capture(&PERFORMANCE_ATTR).as_deref().and_then(parse_rating),
        story: capture(&STORY_ATTR).as_deref().and_then(parse_rating),
        count: capture(&COUNT_ATTR).as_deref().and_then(parse_count),
    }
}

/// Catalog ids of the same work on other storefronts, keyed by region code
pub fn extract_alternate_ids(doc: &Html, regions: &[RegionConfig]) -> BTreeMap<String, String> {
    let mut ids = BTreeMap::new();
    for region in regions {
        let Some(sel) = selector(&format!(r#"link[hreflang="{}"]"#, region.hreflang)) else {
            continue;
        };
        let host_prefix = format!("{}/", region.host);
        let found = doc
            .select(&sel)
            .filter_map(|link| link.value().attr("href"))
            .map(str::trim)
            .filter(|href| href.contains(&host_prefix))
            .find_map(|href| {
                CATALOG_ID_IN_URL
                    .captures(href)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            });
        if let Some(id) = found {
            ids.insert(region.code.clone(), id);
        }
    }
    ids
}

/// First page-state blob that describes the product
pub fn extract_catalog_metadata(doc: &Html) -> Option<CatalogMetadata> {
    let sel = selector(r#"script[type="application/json"]"#)?;
    doc.select(&sel).find_map(|script| {
        let text: String = script.text().collect();
        let parsed: Value = serde_json::from_str(text.trim()).ok()?;
        let object = match parsed {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };
        if !object.is_object() {
            return None;
        }
        let metadata: CatalogMetadata = serde_json::from_value(object).ok()?;
        (metadata != CatalogMetadata::default()).then_some(metadata)
    })
}

/// What a primary detail page yields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimaryPage {
    pub title: String,
    pub ratings: PartialRating,
    pub alternates: BTreeMap<String, String>,
    pub metadata: Option<CatalogMetadata>,
}

pub fn parse_primary_page(html: &str, regions: &[RegionConfig]) -> PrimaryPage {
    let doc = Html::parse_document(html);
    let title = selector("title")
        .and_then(|sel| doc.select(&sel).next().map(element_text))
        .unwrap_or_default();

    PrimaryPage {
        title,
        ratings: extract_ratings(&doc, html),
        alternates: extract_alternate_ids(&doc, regions),
        metadata: extract_catalog_metadata(&doc),
    }
}

/// Per-layer results for diagnostics
pub fn inspect_layers(html: &str) -> Vec<(ExtractionLayer, PartialRating)> {
    let doc = Html::parse_document(html);
    ExtractionLayer::ALL
        .iter()
        .map(|layer| (*layer, run_layer(*layer, &doc, html)))
        .collect()
}

fn is_catalog_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Summary rating of the search-results row for `id`.
///
/// Only returns a value when both the rating and the count were found.
pub fn extract_search_row_rating(html: &str, id: &str) -> Option<PartialRating> {
    if !is_catalog_id(id) {
        return None;
    }
    let doc = Html::parse_document(html);

    let row = selector(&format!(r#"li[data-asin="{}"]"#, id))
        .and_then(|sel| doc.select(&sel).next())
        .or_else(|| {
            let inner = selector(&format!(r#"div[data-asin="{}"]"#, id))
                .and_then(|sel| doc.select(&sel).next())?;
            inner
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "li")
        })?;

    let value_sel = selector(r#"span[class*="ratingLabel"], span[class*="ratingText"]"#)?;
    let count_sel = selector(r#"span[class*="ratingsLabel"], span[class*="ratingCount"]"#)?;

    let overall = row.select(&value_sel).next().and_then(|span| {
        let text = element_text(span);
        FIRST_DECIMAL
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_rating(m.as_str()))
    });
    let count = row.select(&count_sel).next().and_then(|span| {
        let text = element_text(span);
        FIRST_GROUPED_NUMBER
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_count(m.as_str()))
    });

    let found = PartialRating {
        overall,
        count,
        ..Default::default()
    };
    found.has_votes().then_some(found)
}

/// Runtime label such as "Length: 10 hrs and 5 mins" or "10 Std. 5 Min."
pub fn parse_runtime(text: &str) -> Option<u64> {
    let number = |re: &Regex| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    let seconds = number(&RUNTIME_HOURS) * 3600 + number(&RUNTIME_MINUTES) * 60;
    (seconds > 0).then_some(seconds)
}

/// Rows of a primary search-results page
pub fn extract_primary_search_rows(html: &str) -> Vec<CandidateEntry> {
    let doc = Html::parse_document(html);
    let (Some(row_sel), Some(id_sel), Some(title_sel), Some(author_sel), Some(runtime_sel)) = (
        selector(r#"li[class*="productListItem"]"#),
        selector("[data-asin]"),
        selector(r#"h3[class*="bc-heading"]"#),
        selector(r#"li[class*="authorLabel"]"#),
        selector(r#"li[class*="runtimeLabel"]"#),
    ) else {
        return Vec::new();
    };

    doc.select(&row_sel)
        .filter_map(|row| {
            let id = row
                .value()
                .attr("data-asin")
                .or_else(|| {
                    row.select(&id_sel)
                        .next()
                        .and_then(|el| el.value().attr("data-asin"))
                })
                .map(str::trim)
                .filter(|id| !id.is_empty())?
                .to_string();

            let title = row.select(&title_sel).next().map(element_text)?;

            let author = row.select(&author_sel).next().map(|el| {
                let text = element_text(el);
                match text.split_once(':') {
                    Some((_, names)) => names.trim().to_string(),
                    None => text,
                }
            });

            let runtime = row
                .select(&runtime_sel)
                .next()
                .and_then(|el| parse_runtime(&element_text(el)));

            Some(CandidateEntry {
                display_title: title,
                display_author: author.filter(|a| !a.is_empty()),
                external_id: id,
                duration_seconds: runtime,
            })
        })
        .collect()
}

/// Rows of a secondary search-results list; ids are absolute detail URLs
pub fn extract_secondary_search_rows(html: &str, base_url: &str) -> Vec<CandidateEntry> {
    let doc = Html::parse_document(html);
    let (Some(row_sel), Some(title_sel), Some(author_sel)) = (
        selector(r#"tr[itemtype="http://schema.org/Book"]"#),
        selector("a.bookTitle"),
        selector("a.authorName"),
    ) else {
        return Vec::new();
    };

    doc.select(&row_sel)
        .filter_map(|row| {
            let link = row.select(&title_sel).next()?;
            let href = link.value().attr("href")?.trim();
            let url = if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}{}", base_url.trim_end_matches('/'), href)
            };

            Some(CandidateEntry {
                display_title: element_text(link),
                display_author: row
                    .select(&author_sel)
                    .next()
                    .map(element_text)
                    .filter(|a| !a.is_empty()),
                external_id: url,
                duration_seconds: None,
            })
        })
        .collect()
}

/// What a secondary detail page yields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecondaryDetails {
    pub overall: Option<f64>,
    pub count: Option<u64>,
    pub isbn: Option<String>,
    pub asin: Option<String>,
}

fn looks_like_isbn(raw: &str) -> bool {
    let compact: String = raw.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect();
    matches!(compact.len(), 10 | 13)
        && compact
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_digit() || (i == compact.len() - 1 && (c == 'X' || c == 'x')))
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_secondary_details(html: &str) -> SecondaryDetails {
    let doc = Html::parse_document(html);
    let objects = linked_data_objects(&doc);
    let aggregate = aggregate_rating(&objects);

    let mut details = SecondaryDetails {
        overall: aggregate.overall,
        count: aggregate.count,
        isbn: objects
            .iter()
            .filter_map(|o| o.get("isbn").and_then(Value::as_str))
            .find(|isbn| looks_like_isbn(isbn))
            .map(str::to_string),
        asin: None,
    };

    let page_text = collapse_whitespace(&doc.root_element().text().collect::<Vec<_>>().join(" "));

    if details.overall.is_none() {
        details.overall = first_capture(&AVG_RATING_TEXT, &page_text)
            .as_deref()
            .and_then(parse_rating);
    }
    if details.count.is_none() {
        details.count = first_capture(&RATINGS_COUNT_TEXT, &page_text)
            .as_deref()
            .and_then(parse_count);
    }
    if details.isbn.is_none() {
        details.isbn = selector(r#"meta[property="books:isbn"]"#)
            .and_then(|sel| {
                doc.select(&sel)
                    .filter_map(|meta| meta.value().attr("content"))
                    .find(|content| looks_like_isbn(content))
                    .map(str::to_string)
            })
            .or_else(|| first_capture(&ISBN_JSON, html));
    }
    details.asin = first_capture(&ASIN_JSON, html)
        .or_else(|| first_capture(&ASIN_URL_PARAM, html))
        .or_else(|| first_capture(&ASIN_TEXT, &page_text));

    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_regions;

    const WIDGET_PAGE: &str = r#"<html><head><title>The Hobbit Audiobook</title></head><body>
        <adbl-rating-summary performance-value="4.9" story-value="4,7">
          <adbl-star-rating value="4.8" count="5000"></adbl-star-rating>
        </adbl-rating-summary>
        </body></html>"#;

    #[test]
    fn test_parse_rating_bounds() {
        assert_eq!(parse_rating("4,5"), Some(4.5));
        assert_eq!(parse_rating(" 5 "), Some(5.0));
        assert_eq!(parse_rating("0"), None);
        assert_eq!(parse_rating("5.1"), None);
        assert_eq!(parse_rating("n/a"), None);
        assert_eq!(parse_count("120,000"), Some(120_000));
        assert_eq!(parse_count("none"), None);
    }

    #[test]
    fn test_page_title_lower() {
        assert_eq!(page_title_lower("<html><title lang=\"en\"> robot check </title>"), "robot check");
        assert_eq!(page_title_lower("<html><body></body></html>"), "");
    }

    #[test]
    fn test_widget_layer_stops_extraction() {
        let page = parse_primary_page(WIDGET_PAGE, &default_regions());
        assert_eq!(page.ratings.overall, Some(4.8));
        assert_eq!(page.ratings.count, Some(5000));
        assert_eq!(page.ratings.performance, Some(4.9));
        assert_eq!(page.ratings.story, Some(4.7));
        assert_eq!(page.title, "The Hobbit Audiobook");
    }

    #[test]
    fn test_linked_data_fills_missing_count() {
        let html = r#"<html><body>
            <adbl-rating-summary performance-value="4.1"></adbl-rating-summary>
            <script type="application/ld+json">
              [{"@type": "Product"}, {"@type": "Audiobook", "aggregateRating": {"ratingValue": "4.3", "ratingCount": "812"}}]
            </script></body></html>"#;
        let page = parse_primary_page(html, &[]);
        assert_eq!(page.ratings.overall, Some(4.3));
        assert_eq!(page.ratings.count, Some(812));
        assert_eq!(page.ratings.performance, Some(4.1));
    }

    #[test]
    fn test_page_state_tree_walk() {
        let html = r#"<html><body>
            <script id="__NEXT_DATA__" type="application/json">
              {"props": {"pageProps": {"product": {"reviews": {"rating": {"value": 4.6, "count": 321}}}}}}
            </script></body></html>"#;
        let doc = Html::parse_document(html);
        let found = run_layer(ExtractionLayer::PageState, &doc, html);
        assert_eq!(found.overall, Some(4.6));
        assert_eq!(found.count, Some(321));
    }

    #[test]
    fn test_tree_walk_depth_bound() {
        let mut value = serde_json::json!({"value": 4.0, "count": 10});
        for _ in 0..20 {
            value = serde_json::json!({ "nested": value });
        }
        assert!(find_rating_object(&value, 0).is_none());
    }

    #[test]
    fn test_raw_text_ignores_prefixed_attributes() {
        let html = r#"<div story-value="4.2" performance-value="4.4"></div><x-rating value="3.9" count="77">"#;
        let found = raw_text_layer(html);
        assert_eq!(found.overall, Some(3.9));
        assert_eq!(found.story, Some(4.2));
        assert_eq!(found.performance, Some(4.4));
        assert_eq!(found.count, Some(77));
    }

    #[test]
    fn test_alternate_ids_and_metadata() {
        let html = r#"<html><head>
            <link rel="alternate" hreflang="en-us" href="https://www.audible.com/pd/The-Hobbit-Audiobook/B0US000001?x=1">
            <link rel="alternate" hreflang="de-de" href="https://www.audible.de/pd/Der-Hobbit-Hoerbuch/B0DE000001">
            </head><body>
            <script type="application/json">[{"publisher": {"name": "Recorded Books"}, "releaseDate": "09-21-12", "format": "Unabridged Audiobook"}]</script>
            </body></html>"#;
        let page = parse_primary_page(html, &default_regions());
        assert_eq!(page.alternates.get("us").map(String::as_str), Some("B0US000001"));
        assert_eq!(page.alternates.get("de").map(String::as_str), Some("B0DE000001"));

        let metadata = page.metadata.unwrap();
        assert_eq!(metadata.release_date.as_deref(), Some("09-21-12"));
        assert_eq!(metadata.format.as_deref(), Some("Unabridged Audiobook"));
    }

    #[test]
    fn test_search_row_rating_via_ancestor() {
        let html = r#"<html><body><ul>
            <li class="bc-list-item productListItem">
              <div data-asin="B0TEST0001">
                <span class="bc-text ratingLabel">4.5 out of 5 stars</span>
                <span class="bc-text ratingsLabel">1,234 ratings</span>
              </div>
            </li></ul></body></html>"#;
        let found = extract_search_row_rating(html, "B0TEST0001").unwrap();
        assert_eq!(found.overall, Some(4.5));
        assert_eq!(found.count, Some(1234));

        assert!(extract_search_row_rating(html, "B0OTHER001").is_none());
        assert!(extract_search_row_rating(html, "bad\"id").is_none());
    }

    #[test]
    fn test_primary_search_rows() {
        let html = r#"<html><body><ul>
            <li class="bc-list-item productListItem" data-asin="B0HOBBIT01">
              <h3 class="bc-heading"><a>The Hobbit</a></h3>
              <ul>
                <li class="bc-list-item authorLabel">By: <a>J.R.R. Tolkien</a></li>
                <li class="bc-list-item runtimeLabel">Length: 11 hrs and 5 mins</li>
              </ul>
            </li>
            <li class="bc-list-item productListItem">
              <div data-asin="B0SILMA001"></div>
              <h3 class="bc-heading">The Silmarillion</h3>
            </li>
            <li class="bc-list-item productListItem"><h3 class="bc-heading">No id</h3></li>
            </ul></body></html>"#;
        let rows = extract_primary_search_rows(html);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].external_id, "B0HOBBIT01");
        assert_eq!(rows[0].display_author.as_deref(), Some("J.R.R. Tolkien"));
        assert_eq!(rows[0].duration_seconds, Some(11 * 3600 + 5 * 60));
        assert_eq!(rows[1].external_id, "B0SILMA001");
        assert!(rows[1].display_author.is_none());
    }

    #[test]
    fn test_parse_runtime_german() {
        assert_eq!(parse_runtime("Spieldauer: 10 Std. und 2 Min."), Some(36_120));
        assert_eq!(parse_runtime("Length: 45 mins"), Some(2700));
        assert_eq!(parse_runtime("Length: unknown"), None);
    }

    #[test]
    fn test_secondary_rows_and_details() {
        let list = r#"<html><body><table>
            <tr itemscope itemtype="http://schema.org/Book">
              <td><a class="bookTitle" href="/book/show/5907.The_Hobbit"><span>The Hobbit</span></a>
                  <a class="authorName" href="/author/show/656983"><span>J.R.R. Tolkien</span></a></td>
            </tr></table></body></html>"#;
        let rows = extract_secondary_search_rows(list, "https://www.goodreads.com");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].external_id, "https://www.goodreads.com/book/show/5907.The_Hobbit");
        assert_eq!(rows[0].display_title, "The Hobbit");

        let detail = r#"<html><head><meta property="books:isbn" content="null"></head><body>
            <script type="application/ld+json">{"@type": "Book", "isbn": "9780547928227",
              "aggregateRating": {"ratingValue": 4.29, "ratingCount": 4012345, "reviewCount": 90000}}</script>
            </body></html>"#;
        let details = extract_secondary_details(detail);
        assert_eq!(details.overall, Some(4.29));
        assert_eq!(details.count, Some(4_012_345));
        assert_eq!(details.isbn.as_deref(), Some("9780547928227"));
    }

    #[test]
    fn test_secondary_details_text_fallbacks() {
        let detail = r#"<html><body>
            <div>4,12 avg rating · 2,345 ratings</div>
            <a href="https://www.amazon.com/dp/x?creativeASIN=B0ABCDEF12">buy</a>
            </body></html>"#;
        let details = extract_secondary_details(detail);
        assert_eq!(details.overall, Some(4.12));
        assert_eq!(details.count, Some(2345));
        assert_eq!(details.asin.as_deref(), Some("B0ABCDEF12"));
        assert!(details.isbn.is_none());
    }
}
