//! shelfrate - audiobook library rating enrichment
//!
//! Pulls community ratings for the items of an Audiobookshelf library from
//! an audio catalog (with regional storefronts) and a book catalog, and
//! writes them into each item's description as a compact rating block.
//!
//! # Architecture
//!
//! Items are processed strictly one at a time:
//! - The stored catalog id is looked up and, if it looks wrong, replaced
//! - Both catalogs are queried; text searches go through the matcher
//! - The description is rebuilt, recycling earlier sections when a catalog
//!   has nothing new
//! - History and failure counters are flushed after every item
//!
//! # Modules
//!
//! - `adapters`: Media server client, catalog adapters, HTML extraction
//! - `core`: Reconciler, merge, history, orchestrator
//! - `domain`: Library records, rating records, metadata patches
//! - `matching`: Title normalization, scoring, candidate ranking
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Enrich due items
//! ABS_URL=http://abs.local API_TOKEN=... shelfrate run --library lib_1
//!
//! # Inspect how a catalog id extracts on each storefront
//! shelfrate probe B0HOBBIT01
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod matching;

// Re-export main types at crate root for convenience
pub use core::{Orchestrator, RunContext, RunSettings, RunStats, StateStore};
pub use domain::{LibraryItem, LibraryRecord, MatchMethod, RatingRecord};
