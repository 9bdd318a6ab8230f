//! Domain types for shelfrate.
//!
//! - Record: library-side input and per-source rating results
//! - Item: media-server items and metadata patches

pub mod item;
pub mod record;

pub use item::{CurrentMetadata, ItemSummary, LibraryItem, MetadataPatch, SeriesEntry};
pub use record::{CatalogMetadata, CatalogSeries, LibraryRecord, MatchMethod, NamedEntry, RatingRecord};
