//! History Integration Tests
//!
//! Completion policy, cooldown and persistence of the state files.

use chrono::NaiveDate;
use shelfrate::core::{HistoryOutcome, MissingEntry, ReportSource, StateStore};
use tempfile::TempDir;

const MAX_FAIL_ATTEMPTS: u32 = 5;

fn open(dir: &TempDir) -> StateStore {
    StateStore::load(
        dir.path().join("rating_history.json"),
        dir.path().join("failed_history.json"),
        dir.path().join("reports"),
    )
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

#[test]
fn test_cooldown_after_exactly_max_attempts() {
    let dir = TempDir::new().unwrap();
    let key = StateStore::item_key("lib", "li_empty");

    for pass in 1..MAX_FAIL_ATTEMPTS {
        // Reload every pass, like separate runs
        let mut state = open(&dir);
        assert!(state.is_due(&key, today(), 90));
        assert_eq!(
            state.record_outcome(&key, false, MAX_FAIL_ATTEMPTS, today()),
            HistoryOutcome::Strike(pass)
        );
        state.save().unwrap();
    }

    let mut state = open(&dir);
    assert_eq!(
        state.record_outcome(&key, false, MAX_FAIL_ATTEMPTS, today()),
        HistoryOutcome::Cooldown
    );
    state.save().unwrap();

    let state = open(&dir);
    assert!(!state.is_due(&key, today(), 90));
    assert_eq!(state.attempts(&key), 0);
    assert_eq!(state.counts().failed, 0);
}

#[test]
fn test_complete_item_clears_failure_counter() {
    let dir = TempDir::new().unwrap();
    let mut state = open(&dir);
    let key = StateStore::item_key("lib", "li_1");

    state.record_outcome(&key, false, MAX_FAIL_ATTEMPTS, today());
    state.record_outcome(&key, false, MAX_FAIL_ATTEMPTS, today());
    assert_eq!(state.attempts(&key), 2);

    assert_eq!(
        state.record_outcome(&key, true, MAX_FAIL_ATTEMPTS, today()),
        HistoryOutcome::Committed
    );
    assert_eq!(state.attempts(&key), 0);
}

#[test]
fn test_state_files_are_valid_json_after_save() {
    let dir = TempDir::new().unwrap();
    let mut state = open(&dir);
    state.record_outcome("lib_a", true, MAX_FAIL_ATTEMPTS, today());
    state.update_report(
        ReportSource::Primary,
        MissingEntry {
            key: "lib_b".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            identifier: None,
            reason: "Not found".to_string(),
            last_check: "2024-05-01".to_string(),
        },
        false,
    );
    state.save().unwrap();

    let history: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("rating_history.json")).unwrap()).unwrap();
    assert_eq!(history["lib_a"], "2024-05-01");

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("reports/missing_audible.json")).unwrap())
            .unwrap();
    assert_eq!(report[0]["key"], "lib_b");
    assert!(report[0]["identifier"].is_null());

    // No temp files left behind
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .count();
    assert_eq!(leftovers, 2);
}
