//! Identifier reconciliation for the primary catalog.
//!
//! Decides whether the catalog id stored on an item can be trusted, looks for
//! a replacement when it cannot, and writes a changed id back to the media
//! server before the item's ratings are re-fetched.

use tracing::info;

use super::retry::ItemFailure;
use crate::adapters::{MediaLibrary, PrimaryCatalog};
use crate::config::RegionConfig;
use crate::domain::{LibraryRecord, MetadataPatch, RatingRecord};

/// What the id lookup said about the stored id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdState {
    NoId,
    /// No storefront knows the id
    LookupFailed,
    /// Found, but without votes
    LookupEmpty,
    /// Only a storefront other than the language's home storefront has it
    WrongRegion,
    Verified,
}

impl IdState {
    pub fn needs_search(&self) -> bool {
        !matches!(self, IdState::Verified)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            IdState::NoId => "no catalog id on item",
            IdState::LookupFailed => "catalog id not found on any storefront",
            IdState::LookupEmpty => "catalog id has no ratings",
            IdState::WrongRegion => "catalog id only resolves on a foreign storefront",
            IdState::Verified => "catalog id verified",
        }
    }
}

/// Classify the stored id given the result of looking it up
pub fn assess(
    record: &LibraryRecord,
    primary: Option<&RatingRecord>,
    home: Option<&RegionConfig>,
) -> IdState {
    if record.catalog_id().is_none() {
        return IdState::NoId;
    }
    let Some(found) = primary else {
        return IdState::LookupFailed;
    };
    if found.votes() == 0 {
        return IdState::LookupEmpty;
    }
    match (home, found.source_domain.as_deref()) {
        (Some(home), Some(domain)) if !home.host.eq_ignore_ascii_case(domain) => IdState::WrongRegion,
        _ => IdState::Verified,
    }
}

/// Outcome of reconciling one item
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub state: IdState,
    /// Id the rest of the item processing uses
    pub effective_id: Option<String>,
    /// A different id was found and adopted
    pub replaced: bool,
    /// A full-text search was issued
    pub searched: bool,
    /// Best primary catalog data available after reconciliation
    pub primary: Option<RatingRecord>,
}

pub struct Reconciler<'a> {
    catalog: &'a dyn PrimaryCatalog,
    library: &'a dyn MediaLibrary,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(catalog: &'a dyn PrimaryCatalog, library: &'a dyn MediaLibrary, dry_run: bool) -> Self {
        Self {
            catalog,
            library,
            dry_run,
        }
    }

    pub async fn reconcile(
        &self,
        item_id: &str,
        record: &LibraryRecord,
        primary: Option<RatingRecord>,
    ) -> Result<Reconciliation, ItemFailure> {
        let language = record.language.as_deref();
        let home = self.catalog.home_region(language);
        let state = assess(record, primary.as_ref(), home);
        let current = record.catalog_id().map(str::to_string);

        if !state.needs_search() {
            return Ok(Reconciliation {
                state,
                effective_id: current,
                replaced: false,
                searched: false,
                primary,
            });
        }
        info!(reason = state.describe(), "Looking for a replacement catalog id");

        let alternate = match (home, primary.as_ref()) {
            (Some(home), Some(found)) => found
                .alternate_id_for(&home.code, current.as_deref())
                .map(str::to_string),
            _ => None,
        };

        let mut searched = false;
        let candidate = match alternate {
            Some(id) => {
                info!(id = %id, "Using the home storefront's alternate id");
                Some(id)
            }
            None if record.title.trim().is_empty() => None,
            None => {
                searched = true;
                self.catalog
                    .search_by_text(&record.title, &record.authors, record.duration_seconds, language)
                    .await?
            }
        };

        let Some(candidate) = candidate else {
            info!("No replacement found, keeping the data already fetched");
            return Ok(Reconciliation {
                state,
                effective_id: current,
                replaced: false,
                searched,
                primary,
            });
        };

        if current.as_deref() == Some(candidate.as_str()) {
            info!(id = %candidate, "Search returned the stored id, keeping the data already fetched");
            return Ok(Reconciliation {
                state,
                effective_id: current,
                replaced: false,
                searched,
                primary,
            });
        }

        info!(old = ?current, new = %candidate, "New catalog id found");
        if self.dry_run {
            info!("Dry run: catalog id not written");
        } else {
            self.library
                .patch_metadata(item_id, &MetadataPatch::asin(candidate.clone()))
                .await?;
            info!("Catalog id updated on media server");
        }

        let refreshed = self.catalog.fetch_by_id(&candidate, language).await?;
        Ok(Reconciliation {
            state,
            effective_id: Some(candidate),
            replaced: true,
            searched,
            primary: prefer_rated(refreshed, primary),
        })
    }
}

/// Data for the new id, unless it has no ratings and the earlier lookup did
fn prefer_rated(refreshed: Option<RatingRecord>, previous: Option<RatingRecord>) -> Option<RatingRecord> {
    match (refreshed, previous) {
        (Some(fresh), Some(previous)) if !fresh.has_votes() && previous.has_votes() => {
            info!("New catalog id has no ratings yet, keeping the ratings already fetched");
            Some(previous)
        }
        (fresh, previous) => fresh.or(previous),
    }
}
