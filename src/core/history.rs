//! Run history, failure counters and missing-item reports.
//!
//! Everything lives in small JSON files under the state home. They are read
//! once at start, mutated in memory by the single processing loop, and
//! rewritten atomically after every item.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::ResolvedConfig;

const HISTORY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Which catalog a missing-item report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSource {
    Primary,
    Secondary,
}

impl ReportSource {
    pub fn file_name(&self) -> &'static str {
        match self {
            ReportSource::Primary => "missing_audible.json",
            ReportSource::Secondary => "missing_goodreads.json",
        }
    }
}

/// One item a catalog had no data for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingEntry {
    pub key: String,
    pub title: String,
    pub author: String,
    pub identifier: Option<String>,
    pub reason: String,
    pub last_check: String,
}

/// How an item's pass ended for the history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// Complete; not due again until the refresh interval passes
    Committed,
    /// Incomplete too many times; committed anyway
    Cooldown,
    /// Incomplete; the number of incomplete passes so far
    Strike(u32),
}

/// Entry counts of the state files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub history: usize,
    pub failed: usize,
    pub missing_primary: usize,
    pub missing_secondary: usize,
}

/// Persistent per-item state
#[derive(Debug)]
pub struct StateStore {
    history_path: PathBuf,
    failed_path: PathBuf,
    reports_dir: PathBuf,
    history: BTreeMap<String, String>,
    failed: BTreeMap<String, u32>,
    missing_primary: BTreeMap<String, MissingEntry>,
    missing_secondary: BTreeMap<String, MissingEntry>,
}

impl StateStore {
    /// Load the state files named by the configuration
    pub fn open(config: &ResolvedConfig) -> Self {
        Self::load(config.history_path(), config.failed_path(), config.reports_dir())
    }

    /// Load state; missing or unreadable files start empty
    pub fn load(history_path: PathBuf, failed_path: PathBuf, reports_dir: PathBuf) -> Self {
        let history = read_json_or_default(&history_path);
        let failed = read_json_or_default(&failed_path);
        let missing_primary = load_report(&reports_dir.join(ReportSource::Primary.file_name()));
        let missing_secondary = load_report(&reports_dir.join(ReportSource::Secondary.file_name()));

        Self {
            history_path,
            failed_path,
            reports_dir,
            history,
            failed,
            missing_primary,
            missing_secondary,
        }
    }

    /// History key of an item
    pub fn item_key(library_id: &str, item_id: &str) -> String {
        format!("{}_{}", library_id, item_id)
    }

    pub fn last_processed(&self, key: &str) -> Option<NaiveDate> {
        self.history
            .get(key)
            .and_then(|date| NaiveDate::parse_from_str(date, HISTORY_DATE_FORMAT).ok())
    }

    /// Never processed, unreadable date, or older than the refresh interval
    pub fn is_due(&self, key: &str, today: NaiveDate, refresh_days: i64) -> bool {
        match self.last_processed(key) {
            Some(date) => (today - date).num_days() >= refresh_days,
            None => true,
        }
    }

    /// Incomplete passes recorded for an item
    pub fn attempts(&self, key: &str) -> u32 {
        self.failed.get(key).copied().unwrap_or(0)
    }

    /// Apply the completion policy for one pass of an item
    pub fn record_outcome(
        &mut self,
        key: &str,
        complete: bool,
        max_fail_attempts: u32,
        today: NaiveDate,
    ) -> HistoryOutcome {
        let stamp = today.format(HISTORY_DATE_FORMAT).to_string();
        if complete {
            self.history.insert(key.to_string(), stamp);
            self.failed.remove(key);
            return HistoryOutcome::Committed;
        }

        let strikes = self.attempts(key) + 1;
        if strikes >= max_fail_attempts {
            info!(key, strikes, "Maximum attempts reached, item goes into cooldown");
            self.history.insert(key.to_string(), stamp);
            self.failed.remove(key);
            HistoryOutcome::Cooldown
        } else {
            self.failed.insert(key.to_string(), strikes);
            HistoryOutcome::Strike(strikes)
        }
    }

    fn report_mut(&mut self, source: ReportSource) -> &mut BTreeMap<String, MissingEntry> {
        match source {
            ReportSource::Primary => &mut self.missing_primary,
            ReportSource::Secondary => &mut self.missing_secondary,
        }
    }

    pub fn report(&self, source: ReportSource) -> &BTreeMap<String, MissingEntry> {
        match source {
            ReportSource::Primary => &self.missing_primary,
            ReportSource::Secondary => &self.missing_secondary,
        }
    }

    /// Drop the item from a report when found, otherwise (re)insert it
    pub fn update_report(&mut self, source: ReportSource, entry: MissingEntry, found: bool) {
        let report = self.report_mut(source);
        if found {
            report.remove(&entry.key);
        } else {
            report.insert(entry.key.clone(), entry);
        }
    }

    pub fn counts(&self) -> StateCounts {
        StateCounts {
            history: self.history.len(),
            failed: self.failed.len(),
            missing_primary: self.missing_primary.len(),
            missing_secondary: self.missing_secondary.len(),
        }
    }

    /// Write all state files
    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.history_path, &self.history)?;
        write_json_atomic(&self.failed_path, &self.failed)?;
        for source in [ReportSource::Primary, ReportSource::Secondary] {
            let mut entries: Vec<&MissingEntry> = self.report(source).values().collect();
            entries.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.key.cmp(&b.key)));
            write_json_atomic(&self.reports_dir.join(source.file_name()), &entries)?;
        }
        Ok(())
    }
}

fn load_report(path: &Path) -> BTreeMap<String, MissingEntry> {
    let entries: Vec<MissingEntry> = read_json_or_default(path);
    entries.into_iter().map(|e| (e.key.clone(), e)).collect()
}

/// Parse a JSON file, or the default value if it is missing or unparsable
fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read state file, starting empty");
            return T::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unparsable state file, starting empty");
            T::default()
        }
    }
}

/// Write JSON to a temp file in the target directory, sync, then rename
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut temp, value).context("Failed to serialize state")?;
    temp.write_all(b"\n").context("Failed to write state")?;
    temp.as_file().sync_all().context("Failed to sync state file")?;
    temp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::load(
            dir.path().join("rating_history.json"),
            dir.path().join("failed_history.json"),
            dir.path().join("reports"),
        )
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_is_due() {
        let dir = TempDir::new().unwrap();
        let mut state = store(&dir);
        let key = StateStore::item_key("lib", "li_1");
        assert_eq!(key, "lib_li_1");

        assert!(state.is_due(&key, day("2024-05-01"), 90));
        state.record_outcome(&key, true, 5, day("2024-05-01"));
        assert!(!state.is_due(&key, day("2024-07-29"), 90));
        assert!(state.is_due(&key, day("2024-07-30"), 90));
    }

    #[test]
    fn test_unparsable_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("rating_history.json"), "{not json").unwrap();
        let state = store(&dir);
        assert_eq!(state.counts(), StateCounts::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut state = store(&dir);
        let today = day("2024-05-01");

        state.record_outcome("lib_a", true, 5, today);
        state.record_outcome("lib_b", false, 5, today);
        for (key, title) in [("lib_b", "Zeta"), ("lib_c", "Alpha")] {
            state.update_report(
                ReportSource::Secondary,
                MissingEntry {
                    key: key.to_string(),
                    title: title.to_string(),
                    author: "Someone".to_string(),
                    identifier: None,
                    reason: "Not found".to_string(),
                    last_check: "2024-05-01".to_string(),
                },
                false,
            );
        }
        state.save().unwrap();

        let reloaded = store(&dir);
        assert_eq!(reloaded.attempts("lib_b"), 1);
        assert_eq!(reloaded.last_processed("lib_a"), Some(today));
        assert_eq!(reloaded.counts().missing_secondary, 2);

        let raw = std::fs::read_to_string(dir.path().join("reports/missing_goodreads.json")).unwrap();
        let titles: Vec<String> = serde_json::from_str::<Vec<MissingEntry>>(&raw)
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_found_removes_report_entry() {
        let dir = TempDir::new().unwrap();
        let mut state = store(&dir);
        let entry = MissingEntry {
            key: "lib_a".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            identifier: Some("B0DUNE0001".to_string()),
            reason: "Not found".to_string(),
            last_check: "2024-05-01".to_string(),
        };
        state.update_report(ReportSource::Primary, entry.clone(), false);
        assert_eq!(state.report(ReportSource::Primary).len(), 1);
        state.update_report(ReportSource::Primary, entry, true);
        assert!(state.report(ReportSource::Primary).is_empty());
    }
}
