//! Title normalization, similarity scoring and candidate ranking

pub mod normalize;
pub mod ranker;
pub mod scorer;

use serde::{Deserialize, Serialize};

pub use normalize::{clean_title, extract_volume_numbers, normalize_title};
pub use ranker::{select_best, CandidateEntry, RankTarget, RankedMatch};
pub use scorer::{authors_match, score, similarity, MatchScore};

/// Matching thresholds, configurable under `matching:` in config.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchTuning {
    /// Candidates with a raw title score below this are discarded
    #[serde(default = "default_prefilter")]
    pub prefilter: f64,

    /// Combined score a primary-catalog candidate must exceed
    #[serde(default = "default_primary_accept")]
    pub primary_accept: f64,

    /// Combined score a secondary-catalog candidate must exceed
    #[serde(default = "default_secondary_accept")]
    pub secondary_accept: f64,

    /// Title score for the author-override pass (needs a duration match)
    #[serde(default = "default_relaxed_title")]
    pub relaxed_title: f64,

    /// Title score at which a volume-number disagreement is tolerated
    #[serde(default = "default_volume_override")]
    pub volume_override: f64,

    #[serde(default = "default_containment_bonus")]
    pub containment_bonus: f64,

    /// Minimum similarity for two author names to count as the same person
    #[serde(default = "default_author_similarity")]
    pub author_similarity: f64,

    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance_secs: u64,
}

fn default_prefilter() -> f64 {
    0.70
}

fn default_primary_accept() -> f64 {
    0.70
}

fn default_secondary_accept() -> f64 {
    0.75
}

fn default_relaxed_title() -> f64 {
    0.80
}

fn default_volume_override() -> f64 {
    0.90
}

fn default_containment_bonus() -> f64 {
    0.15
}

fn default_author_similarity() -> f64 {
    0.60
}

fn default_duration_tolerance() -> u64 {
    900
}

impl Default for MatchTuning {
    fn default() -> Self {
        Self {
            prefilter: default_prefilter(),
            primary_accept: default_primary_accept(),
            secondary_accept: default_secondary_accept(),
            relaxed_title: default_relaxed_title(),
            volume_override: default_volume_override(),
            containment_bonus: default_containment_bonus(),
            author_similarity: default_author_similarity(),
            duration_tolerance_secs: default_duration_tolerance(),
        }
    }
}
