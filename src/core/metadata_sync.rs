//! Bibliographic metadata sync from the primary catalog.
//!
//! The catalog is treated as the source of truth for publisher, year,
//! language, abridged flag and first series; genres are only ever added.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{CatalogMetadata, CurrentMetadata, MetadataPatch, SeriesEntry};

static FIRST_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)").expect("number regex should compile"));

/// A computed patch plus one human-readable line per changed field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataDiff {
    pub patch: MetadataPatch,
    pub changes: Vec<String>,
}

impl MetadataDiff {
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }
}

fn show(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Year from a `MM-DD-YY` release date; `MM-DD-YYYY` and ISO dates also work
pub fn release_year(release_date: &str) -> Option<String> {
    let parts: Vec<&str> = release_date.trim().split('-').map(str::trim).collect();
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    if let Some(first) = parts.first().filter(|p| p.len() == 4 && all_digits(p)) {
        return Some(first.to_string());
    }
    let last = parts.last().filter(|p| all_digits(p))?;
    match last.len() {
        2 => Some(format!("20{}", last)),
        4 => Some(last.to_string()),
        _ => None,
    }
}

/// Abridged flag implied by a format string such as "Unabridged Audiobook"
pub fn abridged_from_format(format: &str) -> Option<bool> {
    let format = format.trim().to_lowercase();
    if format.is_empty() {
        return None;
    }
    Some(format.contains("abridged") && !format.contains("unabridged"))
}

/// Fields where the catalog disagrees with the item
pub fn diff_metadata(
    catalog: &CatalogMetadata,
    current: &CurrentMetadata,
    current_language: Option<&str>,
) -> MetadataDiff {
    let mut diff = MetadataDiff::default();

    if let Some(publisher) = catalog
        .publisher
        .as_ref()
        .and_then(|p| p.name.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        if current.publisher.as_deref() != Some(publisher) {
            diff.changes.push(format!(
                "Publisher: '{}' -> '{}'",
                show(current.publisher.as_deref()),
                publisher
            ));
            diff.patch.publisher = Some(publisher.to_string());
        }
    }

    if let Some(year) = catalog.release_date.as_deref().and_then(release_year) {
        if current.published_year.as_deref() != Some(year.as_str()) {
            diff.changes.push(format!(
                "Year: '{}' -> '{}'",
                show(current.published_year.as_deref()),
                year
            ));
            diff.patch.published_year = Some(year);
        }
    }

    if let Some(language) = catalog
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
    {
        if current_language != Some(language) {
            diff.changes.push(format!("Language: '{}' -> '{}'", show(current_language), language));
            diff.patch.language = Some(language.to_string());
        }
    }

    if let Some(abridged) = catalog.format.as_deref().and_then(abridged_from_format) {
        if current.abridged != Some(abridged) {
            diff.changes.push(format!("Abridged: {:?} -> {}", current.abridged, abridged));
            diff.patch.abridged = Some(abridged);
        }
    }

    let added: Vec<String> = catalog
        .categories
        .iter()
        .filter_map(|c| c.name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty() && !current.genres.iter().any(|g| g == name))
        .fold(Vec::new(), |mut acc, name| {
            if !acc.iter().any(|a: &String| a == name) {
                acc.push(name.to_string());
            }
            acc
        });
    if !added.is_empty() {
        diff.changes.push(format!("Genres: +{:?}", added));
        let mut genres = current.genres.clone();
        genres.extend(added);
        diff.patch.genres = Some(genres);
    }

    if let Some(series) = catalog.series.first() {
        let name = series.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let sequence = series
            .part
            .as_deref()
            .and_then(|part| FIRST_NUMBER.captures(part))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        if let Some(name) = name {
            let (current_name, current_sequence) = current
                .series
                .first()
                .map(|s| (Some(s.name.as_str()), s.sequence.as_deref()))
                .unwrap_or((None, None));

            let sequence_changed = sequence.is_some() && sequence.as_deref() != current_sequence;
            if current_name != Some(name) || sequence_changed {
                diff.changes.push(format!(
                    "Series: '{}' #{} -> '{}' #{}",
                    show(current_name),
                    show(current_sequence),
                    name,
                    show(sequence.as_deref())
                ));
                diff.patch.series = Some(vec![SeriesEntry {
                    name: name.to_string(),
                    sequence,
                }]);
            }
        }
    }

    diff
}
