//! Best-candidate selection over one page of search results.

use tracing::{debug, info};

use super::scorer::{score, MatchScore};
use super::MatchTuning;

/// One parsed row of a search-results page
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntry {
    pub display_title: String,
    pub display_author: Option<String>,

    /// Catalog id or detail-page path, depending on the source
    pub external_id: String,

    pub duration_seconds: Option<u64>,
}

/// What the ranker is matching against
#[derive(Debug, Clone, Copy)]
pub struct RankTarget<'a> {
    pub title: &'a str,
    pub authors: &'a [String],
    pub duration_seconds: Option<u64>,
}

/// The chosen candidate and why it was chosen
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch {
    pub external_id: String,
    pub display_title: String,
    pub score: MatchScore,

    /// Accepted on title + duration although the author check failed
    pub author_override: bool,
}

/// Duration agreement between local record and candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationCheck {
    /// Both positive and within tolerance
    Match,
    /// Both positive and apart by more than the tolerance
    Mismatch,
    /// At least one side unknown
    Unknown,
}

pub fn check_duration(local: Option<u64>, candidate: Option<u64>, tolerance_secs: u64) -> DurationCheck {
    match (local.filter(|d| *d > 0), candidate.filter(|d| *d > 0)) {
        (Some(a), Some(b)) if a.abs_diff(b) <= tolerance_secs => DurationCheck::Match,
        (Some(_), Some(_)) => DurationCheck::Mismatch,
        _ => DurationCheck::Unknown,
    }
}

/// Pick the best candidate whose combined score exceeds `threshold`.
///
/// Ties keep the first-seen candidate (page order). When nothing passes the
/// strict rules, a relaxed pass accepts a candidate with a high raw title
/// score and a confirmed duration match even if the author check failed.
pub fn select_best(
    candidates: &[CandidateEntry],
    target: &RankTarget<'_>,
    threshold: f64,
    tuning: &MatchTuning,
) -> Option<RankedMatch> {
    let mut best: Option<RankedMatch> = None;
    let mut relaxed: Option<RankedMatch> = None;

    for candidate in candidates {
        let scored = score(
            target.title,
            target.authors,
            &candidate.display_title,
            candidate.display_author.as_deref(),
            tuning,
        );

        if scored.title_score < tuning.prefilter {
            continue;
        }

        let duration = check_duration(
            target.duration_seconds,
            candidate.duration_seconds,
            tuning.duration_tolerance_secs,
        );
        if duration == DurationCheck::Mismatch {
            debug!(
                candidate = %candidate.display_title,
                local = ?target.duration_seconds,
                found = ?candidate.duration_seconds,
                "Skipping candidate: duration differs beyond tolerance"
            );
            continue;
        }

        if !scored.volume_check_with_override(tuning) {
            debug!(candidate = %candidate.display_title, "Skipping candidate: volume numbers disagree");
            continue;
        }

        if !scored.author_accepted {
            if relaxed.is_none()
                && duration == DurationCheck::Match
                && scored.title_score > tuning.relaxed_title
            {
                relaxed = Some(RankedMatch {
                    external_id: candidate.external_id.clone(),
                    display_title: candidate.display_title.clone(),
                    score: scored,
                    author_override: true,
                });
            }
            continue;
        }

        let beats_best = best
            .as_ref()
            .map(|b| scored.combined_score > b.score.combined_score)
            .unwrap_or(true);
        if scored.combined_score > threshold && beats_best {
            best = Some(RankedMatch {
                external_id: candidate.external_id.clone(),
                display_title: candidate.display_title.clone(),
                score: scored,
                author_override: false,
            });
        }
    }

    if best.is_some() {
        return best;
    }

    if let Some(ref r) = relaxed {
        info!(
            candidate = %r.display_title,
            title_score = r.score.title_score,
            "Accepted on title and duration match, author mismatch ignored"
        );
    }
    relaxed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, author: &str, id: &str, duration: Option<u64>) -> CandidateEntry {
        CandidateEntry {
            display_title: title.to_string(),
            display_author: Some(author.to_string()),
            external_id: id.to_string(),
            duration_seconds: duration,
        }
    }

    fn target<'a>(title: &'a str, authors: &'a [String], duration: Option<u64>) -> RankTarget<'a> {
        RankTarget {
            title,
            authors,
            duration_seconds: duration,
        }
    }

    #[test]
    fn test_check_duration() {
        assert_eq!(check_duration(Some(3600), Some(4000), 900), DurationCheck::Match);
        assert_eq!(check_duration(Some(3600), Some(5000), 900), DurationCheck::Mismatch);
        assert_eq!(check_duration(Some(3600), None, 900), DurationCheck::Unknown);
        assert_eq!(check_duration(Some(0), Some(5000), 900), DurationCheck::Unknown);
    }

    #[test]
    fn test_selects_highest_score() {
        let authors = vec!["Frank Herbert".to_string()];
        let candidates = vec![
            entry("Dune Messiah", "Frank Herbert", "B0MESSIAH1", None),
            entry("Dune", "Frank Herbert", "B0DUNE0001", None),
        ];
        let tuning = MatchTuning::default();
        let best = select_best(&candidates, &target("Dune", &authors, None), 0.7, &tuning).unwrap();
        assert_eq!(best.external_id, "B0DUNE0001");
        assert!(!best.author_override);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let authors = vec!["Frank Herbert".to_string()];
        let candidates = vec![
            entry("Dune", "Frank Herbert", "FIRST00001", None),
            entry("Dune", "Frank Herbert", "SECOND0002", None),
        ];
        let tuning = MatchTuning::default();
        let best = select_best(&candidates, &target("Dune", &authors, None), 0.7, &tuning).unwrap();
        assert_eq!(best.external_id, "FIRST00001");
    }

    #[test]
    fn test_duration_mismatch_rejects() {
        let authors = vec!["Frank Herbert".to_string()];
        let candidates = vec![entry("Dune", "Frank Herbert", "B0DUNE0001", Some(20_000))];
        let tuning = MatchTuning::default();
        assert!(select_best(&candidates, &target("Dune", &authors, Some(75_000)), 0.7, &tuning).is_none());
    }

    #[test]
    fn test_wrong_volume_rejected() {
        let authors = vec!["Erin Hunter".to_string()];
        let candidates = vec![entry("Warriors Vol. 10", "Erin Hunter", "B0WAR00010", None)];
        let tuning = MatchTuning::default();
        assert!(select_best(&candidates, &target("Warriors Book 3", &authors, None), 0.7, &tuning).is_none());
    }

    #[test]
    fn test_relaxed_pass_on_title_and_duration() {
        let authors = vec!["Various".to_string()];
        let candidates = vec![entry("The Best of Analog", "Stanley Schmidt", "B0ANALOG01", Some(36_000))];
        let tuning = MatchTuning::default();

        let found = select_best(
            &candidates,
            &target("The Best of Analog", &authors, Some(36_300)),
            0.7,
            &tuning,
        )
        .unwrap();
        assert!(found.author_override);

        // Without a confirmed duration the override does not apply
        assert!(select_best(&candidates, &target("The Best of Analog", &authors, None), 0.7, &tuning).is_none());
    }

    #[test]
    fn test_below_threshold_returns_none() {
        let authors = vec!["Frank Herbert".to_string()];
        let candidates = vec![entry("Dune", "Frank Herbert", "B0DUNE0001", None)];
        let tuning = MatchTuning::default();
        assert!(select_best(&candidates, &target("Dune", &authors, None), 1.2, &tuning).is_none());
    }
}
