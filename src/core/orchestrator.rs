//! Main orchestrator for an enrichment run.
//!
//! Walks each library's due items one at a time: fetch the item, look up and
//! reconcile the primary catalog id, sync metadata, look up the secondary
//! catalog, rebuild the description, then record the outcome and flush state.
//! Block signals from a catalog pause and retry the same item, or abort the
//! run once the retry policy gives up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{MediaLibrary, PrimaryCatalog, SecondaryCatalog};
use crate::config::{LimitsConfig, ResolvedConfig};
use crate::domain::{ItemSummary, MetadataPatch, RatingRecord};

use super::history::{HistoryOutcome, MissingEntry, ReportSource, StateStore};
use super::merge::{build_description, is_complete, previous_sections};
use super::metadata_sync::diff_metadata;
use super::reconciler::Reconciler;
use super::retry::{seconds, BlockRetry, ItemFailure, RetryDecision, RetryPolicy};
use super::summary::{format_duration, RunStats};

const NOT_FOUND_REASON: &str = "Not found";

/// Run-level knobs
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub library_ids: Vec<String>,
    pub refresh_days: i64,
    pub batch_size: usize,
    pub dry_run: bool,
    pub limits: LimitsConfig,
}

impl RunSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            library_ids: config.library_ids.clone(),
            refresh_days: config.refresh_days,
            batch_size: config.batch_size,
            dry_run: config.dry_run,
            limits: config.limits.clone(),
        }
    }
}

/// Mutable state of one run, threaded through item processing
#[derive(Debug)]
pub struct RunContext {
    pub stats: RunStats,
    pub state: StateStore,
    /// Date stamped into the history
    pub today: NaiveDate,
}

impl RunContext {
    pub fn new(state: StateStore, today: NaiveDate) -> Self {
        Self {
            stats: RunStats::default(),
            state,
            today,
        }
    }
}

/// What a finished item means for pacing
#[derive(Debug, Clone, Copy, Default)]
struct ItemDone {
    searched: bool,
}

/// Main enrichment orchestrator
pub struct Orchestrator {
    library: Arc<dyn MediaLibrary>,
    primary: Arc<dyn PrimaryCatalog>,
    secondary: Arc<dyn SecondaryCatalog>,
    settings: RunSettings,
    retry_policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        library: Arc<dyn MediaLibrary>,
        primary: Arc<dyn PrimaryCatalog>,
        secondary: Arc<dyn SecondaryCatalog>,
        settings: RunSettings,
    ) -> Self {
        let retry_policy = RetryPolicy::from_limits(&settings.limits);
        Self {
            library,
            primary,
            secondary,
            settings,
            retry_policy,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Process every configured library; state is flushed again at the end
    pub async fn run(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        info!(
            libraries = self.settings.library_ids.len(),
            dry_run = self.settings.dry_run,
            "Starting enrichment run"
        );

        for library_id in &self.settings.library_ids {
            if ctx.stats.aborted {
                break;
            }
            self.process_library(library_id, ctx).await;
        }

        ctx.state.save().context("Failed to save state at end of run")?;
        if ctx.stats.aborted {
            warn!(summary = %ctx.stats.report_line(), "Run aborted");
        } else {
            info!(summary = %ctx.stats.report_line(), "Run finished");
        }
        Ok(())
    }

    /// Due items of one library, shuffled and capped to the batch size
    fn work_queue(&self, library_id: &str, items: Vec<ItemSummary>, ctx: &RunContext) -> Vec<ItemSummary> {
        let (mut fresh, mut due) = (0usize, 0usize);
        let mut queue: Vec<ItemSummary> = items
            .into_iter()
            .filter(|item| {
                let key = StateStore::item_key(library_id, &item.id);
                if ctx.state.last_processed(&key).is_none() {
                    fresh += 1;
                    true
                } else if ctx.state.is_due(&key, ctx.today, self.settings.refresh_days) {
                    due += 1;
                    true
                } else {
                    false
                }
            })
            .collect();

        queue.shuffle(&mut rand::thread_rng());
        queue.truncate(self.settings.batch_size);
        info!(new = fresh, due, total = queue.len(), "Work queue built");
        queue
    }

    #[instrument(skip(self, ctx))]
    async fn process_library(&self, library_id: &str, ctx: &mut RunContext) {
        let items = match self.library.list_items(library_id).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to list library items, skipping library");
                return;
            }
        };

        let queue = self.work_queue(library_id, items, ctx);
        let total = queue.len();
        let started = Instant::now();

        for (idx, item) in queue.iter().enumerate() {
            let progress = format!("({}/{}) [ETA: {}]", idx + 1, total, eta(started.elapsed(), idx, total));
            let done = self.process_with_retry(library_id, item, &progress, ctx).await;
            if ctx.stats.aborted {
                break;
            }

            if idx + 1 < total {
                let pause = pause_between_items(&self.settings.limits, done.map(|d| d.searched).unwrap_or(false));
                tokio::time::sleep(pause).await;
            }
        }
    }

    /// Process one item, retrying after soft block signals
    async fn process_with_retry(
        &self,
        library_id: &str,
        item: &ItemSummary,
        progress: &str,
        ctx: &mut RunContext,
    ) -> Option<ItemDone> {
        ctx.stats.processed += 1;
        let mut retry = BlockRetry::new(&self.retry_policy);

        loop {
            match self.process_item(library_id, &item.id, progress, ctx).await {
                Ok(done) => return Some(done),
                Err(failure) => match retry.on_failure(&failure) {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(
                            item = %item.id,
                            attempt = retry.attempt(),
                            pause_secs = delay.as_secs(),
                            reason = %failure,
                            "Block signal detected, pausing before retrying item"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::Abort(reason) => {
                        error!(item = %item.id, reason = %reason, "Aborting run due to block signals");
                        ctx.stats.aborted = true;
                        return None;
                    }
                    RetryDecision::GiveUp => {
                        error!(item = %item.id, error = %failure, "Item failed");
                        ctx.stats.failed += 1;
                        return None;
                    }
                },
            }
        }
    }

    async fn process_item(
        &self,
        library_id: &str,
        item_id: &str,
        progress: &str,
        ctx: &mut RunContext,
    ) -> Result<ItemDone, ItemFailure> {
        let item = self
            .library
            .get_item(item_id)
            .await
            .with_context(|| format!("Failed to fetch item {}", item_id))?;
        let record = &item.record;
        let key = StateStore::item_key(library_id, &item.id);
        let language = record.language.as_deref();
        let dry_run = self.settings.dry_run;
        let mut delta = RunStats::default();

        info!(
            "{} {} [id: {}] (Try {}/{})",
            progress,
            record.title,
            record.catalog_id().unwrap_or("-"),
            ctx.state.attempts(&key) + 1,
            self.settings.limits.max_fail_attempts
        );

        // Primary catalog and id reconciliation
        let primary = match record.catalog_id() {
            Some(id) => self.primary.fetch_by_id(id, language).await?,
            None => None,
        };
        let reconciliation = Reconciler::new(self.primary.as_ref(), self.library.as_ref(), dry_run)
            .reconcile(&item.id, record, primary)
            .await?;
        if reconciliation.replaced {
            delta.ids_migrated += 1;
            if record.catalog_id().is_none() {
                delta.ids_found += 1;
            }
        }
        let effective_id = reconciliation.effective_id.clone();
        let primary = reconciliation.primary;

        if let Some(metadata) = primary.as_ref().and_then(|p| p.catalog_metadata.as_ref()) {
            let diff = diff_metadata(metadata, &item.current, language);
            if diff.is_empty() {
                info!("No metadata updates necessary");
            } else {
                for change in &diff.changes {
                    info!(change = %change, "Metadata update");
                }
                if dry_run {
                    info!("Dry run: metadata not written");
                } else {
                    self.library.patch_metadata(&item.id, &diff.patch).await?;
                }
                delta.meta_updated += 1;
            }
        }

        tokio::time::sleep(seconds(self.settings.limits.source_gap_secs)).await;

        // Secondary catalog
        let secondary = self.secondary.lookup(record, effective_id.as_deref()).await?;
        let found_isbn = secondary
            .as_ref()
            .and_then(|s| s.secondary_id_found.as_deref())
            .and_then(|found| {
                let isbn = valid_isbn(found);
                if isbn.is_none() {
                    debug!(found = %found, "Secondary catalog id is not an ISBN, not written");
                }
                isbn
            });
        if let Some(found_isbn) = found_isbn {
            let current = record.secondary_id();
            if current.map(|c| compact_isbn(c).to_uppercase()).as_ref() != Some(&found_isbn) {
                info!(old = ?current, new = %found_isbn, "Secondary id added or repaired");
                if dry_run {
                    info!("Dry run: secondary id not written");
                } else {
                    self.library
                        .patch_metadata(&item.id, &MetadataPatch::isbn(found_isbn.as_str()))
                        .await?;
                }
                if current.is_none() {
                    delta.isbn_added += 1;
                } else {
                    delta.isbn_repaired += 1;
                }
            }
        }

        // Description
        let previous = previous_sections(&record.raw_description);
        let merged = build_description(
            &record.raw_description,
            primary.as_ref(),
            secondary.as_ref(),
            previous.primary.as_deref(),
            previous.secondary.as_deref(),
        );
        delta.recycled += merged.recycled;

        if merged.text != record.raw_description {
            if dry_run {
                info!("Dry run: description not written");
            } else {
                self.library
                    .patch_metadata(&item.id, &MetadataPatch::description(merged.text.clone()))
                    .await?;
            }
        }

        let primary_fresh = primary.as_ref().map(RatingRecord::votes).unwrap_or(0) > 0;
        let secondary_fresh = secondary.is_some();
        if primary_fresh || secondary_fresh {
            delta.success += 1;
            info!(
                primary = primary_fresh,
                secondary = secondary_fresh,
                recycled = merged.recycled,
                "Ratings updated"
            );
        }

        // History
        let today = ctx.today.format("%Y-%m-%d").to_string();
        let entry = |identifier: Option<&str>| MissingEntry {
            key: key.clone(),
            title: record.title.clone(),
            author: record.primary_author().to_string(),
            identifier: identifier.map(str::to_string),
            reason: NOT_FOUND_REASON.to_string(),
            last_check: today.clone(),
        };
        ctx.state
            .update_report(ReportSource::Primary, entry(effective_id.as_deref()), primary_fresh);
        ctx.state
            .update_report(ReportSource::Secondary, entry(record.secondary_id()), secondary_fresh);

        let complete = is_complete(effective_id.is_some(), merged.primary_present, merged.secondary_present);
        match ctx
            .state
            .record_outcome(&key, complete, self.settings.limits.max_fail_attempts, ctx.today)
        {
            HistoryOutcome::Committed => {}
            HistoryOutcome::Cooldown => delta.cooldown += 1,
            HistoryOutcome::Strike(strikes) => {
                delta.partial += 1;
                warn!(strikes, "Partial or no data, will retry on a later run");
            }
        }
        ctx.state.save().context("Failed to save state")?;

        ctx.stats.absorb(&delta);
        Ok(ItemDone {
            searched: reconciliation.searched,
        })
    }
}

/// ISBN without hyphens or spaces
fn compact_isbn(raw: &str) -> String {
    raw.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect()
}

/// Compact ISBN-10 or ISBN-13, or `None` for anything else (e.g. an ASIN)
fn valid_isbn(raw: &str) -> Option<String> {
    let compact = compact_isbn(raw).to_uppercase();
    let valid = match compact.len() {
        13 => compact.chars().all(|c| c.is_ascii_digit()),
        10 => {
            let (body, check) = compact.split_at(9);
            body.chars().all(|c| c.is_ascii_digit()) && check.chars().all(|c| c.is_ascii_digit() || c == 'X')
        }
        _ => false,
    };
    valid.then_some(compact)
}

/// Remaining time from the average of the items done so far
fn eta(elapsed: Duration, done: usize, total: usize) -> String {
    if done == 0 {
        return "-".to_string();
    }
    let remaining = total.saturating_sub(done) as u32;
    format_duration(elapsed / done as u32 * remaining)
}

/// Base pause plus jitter, plus the search penalty after a full-text search
fn pause_between_items(limits: &LimitsConfig, searched: bool) -> Duration {
    let (low, high) = (limits.jitter_min_secs.max(0.0), limits.jitter_max_secs.max(0.0));
    let jitter = if high > low {
        rand::thread_rng().gen_range(low..=high)
    } else {
        low
    };
    let penalty = if searched { limits.search_penalty_secs } else { 0.0 };
    seconds(limits.base_sleep_secs + jitter + penalty)
}
