//! Rating block rendering and description merging.
//!
//! The block is a run of `<br>`-joined lines between a fixed header and a
//! fixed footer, inserted at the top of the item description. Rebuilding a
//! description strips every earlier block (and the legacy `**Audible** ...
//! ---` format) first, so repeated runs never stack blocks.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::RatingRecord;

pub const BLOCK_HEADER: &str = "⭐ Ratings & Infos";
pub const BLOCK_FOOTER: &str = "⭐";
const LINE_BREAK: &str = "<br>";

const MOON_FULL: &str = "🌕";
const MOON_HALF: &str = "🌗";
const MOON_EMPTY: &str = "🌑";
const MOON_SLOTS: u32 = 5;

static RATING_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)⭐\s*Ratings.*?⭐(?:\s|<br\s*/?>)*").expect("rating block regex should compile")
});

static LEGACY_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\*\*Audible\*\*.*?---\s*\n*").expect("legacy block regex should compile")
});

static PRIMARY_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(Audible.*?)<br>\s*(?:Goodreads|⭐)").expect("primary section regex should compile")
});

static SECONDARY_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(Goodreads.*?)<br>\s*⭐").expect("secondary section regex should compile")
});

static LEADING_BREAKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:\s|<br\s*/?>)+").expect("leading break regex should compile"));

/// Five-slot rendering of a 0-5 value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoonBar {
    pub full: u32,
    pub half: u32,
    pub empty: u32,
}

impl MoonBar {
    pub fn render(&self) -> String {
        format!(
            "{}{}{}",
            MOON_FULL.repeat(self.full as usize),
            MOON_HALF.repeat(self.half as usize),
            MOON_EMPTY.repeat(self.empty as usize)
        )
    }
}

/// Full slots are the integer part, rounded up from .75; a half slot covers
/// fractions in [0.25, 0.75).
pub fn moon_bar(value: f64) -> MoonBar {
    if !value.is_finite() || value <= 0.0 {
        return MoonBar {
            full: 0,
            half: 0,
            empty: MOON_SLOTS,
        };
    }

    let value = value.min(MOON_SLOTS as f64);
    let mut full = value.floor() as u32;
    let fraction = value - value.floor();
    let mut half = 0;
    if fraction >= 0.75 {
        full += 1;
    } else if fraction >= 0.25 {
        half = 1;
    }
    let full = full.min(MOON_SLOTS);
    let half = half.min(MOON_SLOTS - full);

    MoonBar {
        full,
        half,
        empty: MOON_SLOTS - full - half,
    }
}

fn rating_line(icon: &str, value: f64, label: &str) -> String {
    format!("{} {} {:.1} / 5 - {}", icon, moon_bar(value).render(), value, label)
}

/// Lines of the primary catalog section
pub fn render_primary(record: &RatingRecord) -> Vec<String> {
    let mut lines = vec![format!("Audible ({}):", record.votes())];
    for (icon, value, label) in [
        ("🏆", record.overall, "Overall"),
        ("🎙️", record.performance, "Performance"),
        ("📖", record.story, "Story"),
    ] {
        if let Some(value) = value.filter(|v| *v > 0.0) {
            lines.push(rating_line(icon, value, label));
        }
    }
    lines
}

/// Lines of the secondary catalog section
pub fn render_secondary(record: &RatingRecord) -> Vec<String> {
    let mut lines = vec![format!("Goodreads ({}):", record.votes())];
    if let Some(value) = record.overall.filter(|v| *v > 0.0) {
        lines.push(rating_line("🏆", value, "Rating"));
    }
    lines
}

/// Sections of an earlier rating block, verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousSections {
    pub primary: Option<String>,
    pub secondary: Option<String>,
}

/// Find the sections of an already rendered block in a description
pub fn previous_sections(description: &str) -> PreviousSections {
    let Some(block) = RATING_BLOCK.find(description) else {
        return PreviousSections::default();
    };
    let block = block.as_str();

    let capture = |re: &Regex| {
        re.captures(block)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    PreviousSections {
        primary: capture(&PRIMARY_SECTION),
        secondary: capture(&SECONDARY_SECTION),
    }
}

/// Description with every rating block (current and legacy format) removed
pub fn strip_rating_blocks(description: &str) -> String {
    let without_block = RATING_BLOCK.replace_all(description, "");
    let without_legacy = LEGACY_BLOCK.replace_all(&without_block, "");
    LEADING_BREAKS.replace(&without_legacy, "").trim().to_string()
}

/// A rebuilt description and what went into it
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDescription {
    pub text: String,
    /// Fresh primary data with votes, or a recycled primary section
    pub primary_present: bool,
    /// Fresh secondary data, or a recycled secondary section
    pub secondary_present: bool,
    /// Sections re-emitted from the previous block
    pub recycled: u32,
}

/// Rebuild a description around fresh or recycled rating sections
pub fn build_description(
    existing: &str,
    primary: Option<&RatingRecord>,
    secondary: Option<&RatingRecord>,
    recycled_primary: Option<&str>,
    recycled_secondary: Option<&str>,
) -> MergedDescription {
    let mut lines = vec![BLOCK_HEADER.to_string()];
    let mut recycled = 0;

    let primary_present = match (primary.filter(|r| r.votes() > 0), recycled_primary) {
        (Some(fresh), _) => {
            lines.extend(render_primary(fresh));
            true
        }
        (None, Some(previous)) => {
            lines.push(previous.to_string());
            recycled += 1;
            true
        }
        (None, None) => false,
    };

    let secondary_present = match (secondary, recycled_secondary) {
        (Some(fresh), _) => {
            lines.extend(render_secondary(fresh));
            true
        }
        (None, Some(previous)) => {
            lines.push(previous.to_string());
            recycled += 1;
            true
        }
        (None, None) => false,
    };

    lines.push(BLOCK_FOOTER.to_string());
    let text = format!("{}{}{}", lines.join(LINE_BREAK), LINE_BREAK, strip_rating_blocks(existing));

    MergedDescription {
        text,
        primary_present,
        secondary_present,
        recycled,
    }
}

/// With an id both catalogs must be covered; without one only the secondary
pub fn is_complete(has_catalog_id: bool, primary_present: bool, secondary_present: bool) -> bool {
    if has_catalog_id {
        primary_present && secondary_present
    } else {
        secondary_present
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MatchMethod;

    fn primary(overall: f64, votes: u64) -> RatingRecord {
        let mut record = RatingRecord::new(MatchMethod::IdLookup);
        record.overall = Some(overall);
        record.performance = Some(4.9);
        record.story = Some(4.7);
        record.vote_count = Some(votes);
        record
    }

    fn secondary(overall: f64, votes: u64) -> RatingRecord {
        let mut record = RatingRecord::new(MatchMethod::TextSearchDirect);
        record.overall = Some(overall);
        record.vote_count = Some(votes);
        record
    }

    #[test]
    fn test_moon_bar_rounding() {
        assert_eq!(moon_bar(4.0), MoonBar { full: 4, half: 0, empty: 1 });
        assert_eq!(moon_bar(4.3), MoonBar { full: 4, half: 1, empty: 0 });
        assert_eq!(moon_bar(4.8), MoonBar { full: 5, half: 0, empty: 0 });
        assert_eq!(moon_bar(0.0), MoonBar { full: 0, half: 0, empty: 5 });
        assert_eq!(moon_bar(3.2), MoonBar { full: 3, half: 0, empty: 2 });
        assert_eq!(moon_bar(7.0), MoonBar { full: 5, half: 0, empty: 0 });
        assert_eq!(moon_bar(4.0).render(), "🌕🌕🌕🌕🌑");
    }

    #[test]
    fn test_render_primary_lines() {
        let lines = render_primary(&primary(4.8, 5000));
        assert_eq!(lines[0], "Audible (5000):");
        assert_eq!(lines[1], "🏆 🌕🌕🌕🌕🌕 4.8 / 5 - Overall");
        assert_eq!(lines[2], "🎙️ 🌕🌕🌕🌕🌕 4.9 / 5 - Performance");
        assert_eq!(lines[3], "📖 🌕🌕🌕🌕🌗 4.7 / 5 - Story");
    }

    #[test]
    fn test_build_and_rebuild_does_not_stack() {
        let first = build_description(
            "<p>There and back again.</p>",
            Some(&primary(4.8, 5000)),
            Some(&secondary(4.7, 120_000)),
            None,
            None,
        );
        assert!(first.text.starts_with("⭐ Ratings & Infos<br>Audible (5000):"));
        assert!(first.text.ends_with("⭐<br><p>There and back again.</p>"));

        let second = build_description(&first.text, Some(&primary(4.8, 5001)), None, None, None);
        assert_eq!(second.text.matches(BLOCK_HEADER).count(), 1);
        assert!(second.text.contains("Audible (5001):"));
        assert!(!second.text.contains("Goodreads"));
    }

    #[test]
    fn test_previous_sections_found() {
        let merged = build_description(
            "Blurb",
            Some(&primary(4.8, 5000)),
            Some(&secondary(4.7, 120_000)),
            None,
            None,
        );
        let sections = previous_sections(&merged.text);
        let audible = sections.primary.unwrap();
        assert!(audible.starts_with("Audible (5000):"));
        assert!(audible.ends_with("- Story"));
        assert_eq!(
            sections.secondary.as_deref(),
            Some("Goodreads (120000):<br>🏆 🌕🌕🌕🌕🌗 4.7 / 5 - Rating")
        );
        assert_eq!(previous_sections("Plain Audible mention"), PreviousSections::default());
    }

    #[test]
    fn test_zero_vote_primary_not_rendered() {
        let merged = build_description("", Some(&primary(4.8, 0)), None, None, None);
        assert!(!merged.primary_present);
        assert_eq!(merged.text, "⭐ Ratings & Infos<br>⭐<br>");
    }

    #[test]
    fn test_legacy_block_stripped() {
        let legacy = "**Audible** 4.5 (300)\n---\n\nActual description";
        assert_eq!(strip_rating_blocks(legacy), "Actual description");
        assert_eq!(strip_rating_blocks("<br/> <br>Text"), "Text");
    }

    #[test]
    fn test_completion_policy() {
        assert!(is_complete(true, true, true));
        assert!(!is_complete(true, true, false));
        assert!(!is_complete(true, false, true));
        assert!(is_complete(false, false, true));
        assert!(!is_complete(false, true, false));
    }
}
