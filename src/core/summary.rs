//! Run statistics and the summary handed to the notification step.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

/// Counters of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Items whose processing started
    pub processed: u32,
    /// Items with fresh data from at least one catalog
    pub success: u32,
    /// Items that failed with an error
    pub failed: u32,
    /// Items left incomplete (failure counter incremented)
    pub partial: u32,
    /// Items put into cooldown after too many incomplete passes
    pub cooldown: u32,
    /// Rating sections re-emitted from an earlier block
    pub recycled: u32,
    /// Catalog ids found for items that had none
    pub ids_found: u32,
    /// Catalog ids replaced (including newly found ones)
    pub ids_migrated: u32,
    pub isbn_added: u32,
    pub isbn_repaired: u32,
    pub meta_updated: u32,
    /// Stopped early on block signals
    pub aborted: bool,
}

impl RunStats {
    /// Add the counters of one item
    pub fn absorb(&mut self, item: &RunStats) {
        self.processed += item.processed;
        self.success += item.success;
        self.failed += item.failed;
        self.partial += item.partial;
        self.cooldown += item.cooldown;
        self.recycled += item.recycled;
        self.ids_found += item.ids_found;
        self.ids_migrated += item.ids_migrated;
        self.isbn_added += item.isbn_added;
        self.isbn_repaired += item.isbn_repaired;
        self.meta_updated += item.meta_updated;
        self.aborted |= item.aborted;
    }

    pub fn has_changes(&self) -> bool {
        self.success > 0
            || self.recycled > 0
            || self.ids_found > 0
            || self.ids_migrated > 0
            || self.isbn_added > 0
            || self.meta_updated > 0
    }

    /// One-line human summary
    pub fn report_line(&self) -> String {
        let mut line = format!(
            "Processed: {} | New: {} | Recycled: {} | IDs found: {} | Migrated: {} | ISBN+: {} | ISBN fixed: {} | Meta: {} | Partial: {} | Cooldown: {} | Errors: {}",
            self.processed,
            self.success,
            self.recycled,
            self.ids_found,
            self.ids_migrated,
            self.isbn_added,
            self.isbn_repaired,
            self.meta_updated,
            self.partial,
            self.cooldown,
            self.failed
        );
        if self.aborted {
            line.push_str(" | ABORTED (rate limit)");
        }
        line
    }
}

/// Subject, icon class and header for the notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Headline {
    pub subject: &'static str,
    pub icon: &'static str,
    pub header: &'static str,
}

pub fn headline(stats: &RunStats) -> Headline {
    if stats.aborted {
        Headline {
            subject: "Shelfrate: aborted 🛑",
            icon: "alert",
            header: "Rate limit detected!",
        }
    } else if stats.failed > 0 {
        Headline {
            subject: "Shelfrate: errors ❌",
            icon: "alert",
            header: "Errors occurred!",
        }
    } else if stats.has_changes() {
        Headline {
            subject: "Shelfrate: success ✅",
            icon: "normal",
            header: "Update finished",
        }
    } else {
        Headline {
            subject: "Shelfrate: info ℹ️",
            icon: "normal",
            header: "No changes",
        }
    }
}

/// `1h 5m`, `3m 20s` or `42s`
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Single-quoted shell value
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `KEY='value'` lines for the notification step
pub fn render_env(stats: &RunStats, elapsed: Duration, log_file: Option<&str>) -> String {
    let headline = headline(stats);
    let pairs = [
        ("ABS_SUBJECT", headline.subject.to_string()),
        ("ABS_ICON", headline.icon.to_string()),
        ("ABS_HEADER", headline.header.to_string()),
        ("ABS_DURATION", format_duration(elapsed)),
        ("ABS_REPORT_BODY", stats.report_line()),
        ("ABS_LOG_FILE", log_file.unwrap_or_default().to_string()),
    ];

    pairs
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, quote(value)))
        .collect()
}

pub fn write_env_file(path: &Path, stats: &RunStats, elapsed: Duration, log_file: Option<&str>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, render_env(stats, elapsed, log_file))
        .with_context(|| format!("Failed to write run summary: {}", path.display()))
}
