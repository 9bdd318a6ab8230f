//! Core enrichment logic.
//!
//! This module contains:
//! - Reconciler: catalog id verification and replacement
//! - Merge: rating block rendering and description rebuilding
//! - History: per-item state files and missing-item reports
//! - Metadata sync: catalog metadata diffing
//! - Retry: block-signal retry policy
//! - Orchestrator: the per-item run loop
//! - Summary: run statistics and the notification file

pub mod history;
pub mod merge;
pub mod metadata_sync;
pub mod orchestrator;
pub mod reconciler;
pub mod retry;
pub mod summary;

// Re-export commonly used types
pub use history::{HistoryOutcome, MissingEntry, ReportSource, StateCounts, StateStore};
pub use merge::{build_description, is_complete, moon_bar, previous_sections, strip_rating_blocks, MergedDescription, MoonBar};
pub use metadata_sync::{diff_metadata, MetadataDiff};
pub use orchestrator::{Orchestrator, RunContext, RunSettings};
pub use reconciler::{assess, IdState, Reconciler, Reconciliation};
pub use retry::{BlockRetry, ItemFailure, RetryDecision, RetryPolicy};
pub use summary::{write_env_file, RunStats};
