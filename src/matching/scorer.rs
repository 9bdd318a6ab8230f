//! Title similarity and author acceptance between a library record and a
//! scraped candidate.
//!
//! Both catalog adapters go through this one scorer; acceptance thresholds
//! differ only by call site and live in [`MatchTuning`].

use std::collections::HashSet;

use serde::Serialize;
use strsim::normalized_levenshtein;

use super::normalize::{extract_volume_numbers, normalize_title, volumes_compatible};
use super::MatchTuning;

/// Outcome of comparing one candidate against the local record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchScore {
    /// Best of raw and normalized similarity, before bonuses
    pub title_score: f64,

    pub author_accepted: bool,

    /// False when both titles carry volume numbers and none agree
    pub volume_numbers_compatible: bool,

    /// `title_score` plus containment bonus
    pub combined_score: f64,
}

impl MatchScore {
    /// Volume veto, lifted when the raw title score alone is high enough to
    /// tolerate inconsistent volume labeling. Only callers opt into this.
    pub fn volume_check_with_override(&self, tuning: &MatchTuning) -> bool {
        self.volume_numbers_compatible || self.title_score >= tuning.volume_override
    }

    /// Strict acceptance: author, volume numbers and threshold
    pub fn is_accepted(&self, threshold: f64) -> bool {
        self.author_accepted && self.volume_numbers_compatible && self.combined_score > threshold
    }
}

/// Symmetric similarity in [0, 1]; 1.0 for identical strings
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

/// Compare local title/authors with a candidate title/author string.
pub fn score(
    local_title: &str,
    local_authors: &[String],
    candidate_title: &str,
    candidate_author: Option<&str>,
    tuning: &MatchTuning,
) -> MatchScore {
    let title_score = title_similarity(local_title, candidate_title);

    let norm_local = normalize_title(local_title);
    let norm_candidate = normalize_title(candidate_title);
    let mut combined_score = title_score;
    if contains_either(&norm_local, &norm_candidate) {
        combined_score += tuning.containment_bonus;
    }

    let volume_numbers_compatible = volumes_compatible(
        &extract_volume_numbers(local_title),
        &extract_volume_numbers(candidate_title),
    );

    let author_accepted = candidate_author
        .map(|author| authors_match(local_authors, author, tuning.author_similarity))
        .unwrap_or(false);

    MatchScore {
        title_score,
        author_accepted,
        volume_numbers_compatible,
        combined_score,
    }
}

/// Best of lowercase raw similarity and normalized similarity
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let raw = similarity(&a.trim().to_lowercase(), &b.trim().to_lowercase());

    let norm_a = normalize_title(a);
    let norm_b = normalize_title(b);
    // Titles made only of noise normalize to "", which would compare as equal
    if norm_a.is_empty() || norm_b.is_empty() {
        return raw;
    }

    raw.max(similarity(&norm_a, &norm_b))
}

/// One normalized title contains the other, and the shorter has length > 3
fn contains_either(a: &str, b: &str) -> bool {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    shorter.chars().count() > 3 && longer.contains(shorter)
}

/// Decide whether any local author matches the candidate author string.
///
/// The candidate may list several authors ("A, B & C") or use "Last, First"
/// order; both the whole string and each split part are tried.
pub fn authors_match(local_authors: &[String], candidate: &str, min_similarity: f64) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return false;
    }

    let mut candidate_parts = vec![candidate.to_lowercase()];
    candidate_parts.extend(split_authors(candidate));

    local_authors
        .iter()
        .flat_map(|author| {
            let mut parts = vec![author.trim().to_lowercase()];
            parts.extend(split_authors(author));
            parts
        })
        .filter(|local| !local.is_empty())
        .any(|local| {
            candidate_parts
                .iter()
                .any(|part| author_pair_matches(&local, part, min_similarity))
        })
}

fn author_pair_matches(local: &str, candidate: &str, min_similarity: f64) -> bool {
    if candidate.is_empty() {
        return false;
    }

    if similarity(local, candidate) > min_similarity {
        return true;
    }

    let local_tokens = name_tokens(local);
    let candidate_tokens = name_tokens(candidate);
    let shared = local_tokens.intersection(&candidate_tokens).count();

    // Single-word pen names only have one token to share
    shared >= 2 || (shared == 1 && local_tokens.len() == 1)
}

/// Split a multi-author string on ",", "&", ";" and the word "and"
fn split_authors(names: &str) -> Vec<String> {
    names
        .split([',', '&', ';'])
        .flat_map(|chunk| {
            let lower = chunk.to_lowercase();
            lower
                .split(" and ")
                .map(|s| s.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Case-folded alphanumeric tokens longer than one character
fn name_tokens(name: &str) -> HashSet<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authors(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_similarity_identity_and_symmetry() {
        assert_eq!(similarity("dune", "dune"), 1.0);
        assert_eq!(
            similarity("the hobbit", "the hobit"),
            similarity("the hobit", "the hobbit")
        );
    }

    #[test]
    fn test_title_similarity_uses_normalized_form() {
        let raw_only = similarity("the expanse book one", "the expanse 1");
        let best = title_similarity("The Expanse Book One", "The Expanse 1");
        assert!(best > raw_only);
        assert_eq!(best, 1.0);
    }

    #[test]
    fn test_noise_only_titles_do_not_compare_equal() {
        let s = title_similarity("(Unabridged)", "[Dramatized Adaptation]");
        assert!(s < 1.0);
    }

    #[test]
    fn test_containment_bonus() {
        let tuning = MatchTuning::default();
        let result = score(
            "The Hobbit",
            &authors(&["J.R.R. Tolkien"]),
            "The Hobbit, or There and Back Again",
            Some("J. R. R. Tolkien"),
            &tuning,
        );
        assert!(result.combined_score > result.title_score);
        assert!((result.combined_score - result.title_score - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_author_tolerates_last_first_order() {
        assert!(authors_match(
            &authors(&["J. R. R. Tolkien"]),
            "Tolkien, J.R.R.",
            0.6
        ));
        assert!(authors_match(
            &authors(&["Brandon Sanderson"]),
            "Sanderson, Brandon",
            0.6
        ));
    }

    #[test]
    fn test_author_rejects_different_person() {
        assert!(!authors_match(
            &authors(&["Brandon Sanderson"]),
            "Patrick Rothfuss",
            0.6
        ));
        assert!(!authors_match(&authors(&["Brandon Sanderson"]), "", 0.6));
        assert!(!authors_match(&[], "Brandon Sanderson", 0.6));
    }

    #[test]
    fn test_author_multi_author_candidate() {
        assert!(authors_match(
            &authors(&["Robert Jordan"]),
            "Robert Jordan, Brandon Sanderson",
            0.6
        ));
        assert!(authors_match(
            &authors(&["Neil Gaiman"]),
            "Terry Pratchett & Neil Gaiman",
            0.6
        ));
        assert!(authors_match(
            &authors(&["Neil Gaiman"]),
            "Terry Pratchett and Neil Gaiman",
            0.6
        ));
    }

    #[test]
    fn test_author_single_word_pen_name() {
        assert!(authors_match(&authors(&["Moebius"]), "Jean Giraud Moebius", 0.6));
        // Two-token local name needs two shared tokens
        assert!(!authors_match(&authors(&["Jean Dupont"]), "Jean Valjean", 0.6));
    }

    #[test]
    fn test_author_partial_name_not_enough() {
        assert!(!authors_match(&authors(&["Brandon Sanderson"]), "Sanderson", 0.6));
        assert!(!authors_match(
            &authors(&["John Smith"]),
            "John Smithson-Williams Jr.",
            0.6
        ));
    }

    #[test]
    fn test_volume_veto_and_override() {
        let tuning = MatchTuning::default();
        let s = score(
            "Series Book 3",
            &authors(&["A Writer"]),
            "Series, Vol. 10",
            Some("A Writer"),
            &tuning,
        );
        assert!(!s.volume_numbers_compatible);
        assert!(!s.is_accepted(0.0));

        let forced = MatchScore {
            title_score: 0.95,
            author_accepted: true,
            volume_numbers_compatible: false,
            combined_score: 0.95,
        };
        assert!(!forced.is_accepted(0.7));
        assert!(forced.volume_check_with_override(&tuning));
    }
}
