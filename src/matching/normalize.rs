//! Title normalization.
//!
//! Two variants exist: a *search* form that keeps the original casing and only
//! drops format noise and subtitles (used to build catalog queries), and a
//! *comparison* form that is reduced to lowercase alphanumeric tokens (used by
//! the scorer). Both sides of any comparison must go through the same variant.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Edition/format words and bracketed asides
static FORMAT_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:unabridged|abridged|audiobook|graphic audio|dramatized adaptation)\b|[\(\[].*?[\)\]]")
        .expect("format noise regex should compile")
});

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\(\[].*?[\)\]]").expect("bracket regex should compile"));

static VOLUME_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\b(?:book|vol\.?|volume|part|no\.?)|#)\s*(\d+)")
        .expect("volume marker regex should compile")
});

static TRAILING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)$").expect("trailing number regex should compile"));

/// Spelled-out numbers (English and German) mapped to digits
const NUMBER_WORDS: &[(&str, &str)] = &[
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("ten", "10"),
    ("eins", "1"),
    ("zwei", "2"),
    ("drei", "3"),
    ("vier", "4"),
    ("fünf", "5"),
    ("sechs", "6"),
    ("sieben", "7"),
    ("acht", "8"),
    ("neun", "9"),
    ("zehn", "10"),
];

/// Single-token noise dropped from the comparison form
const NOISE_WORDS: &[&str] = &[
    "unabridged",
    "abridged",
    "audiobook",
    "book",
    "vol",
    "volume",
    "part",
    "no",
    "nr",
    "band",
    "teil",
    "buch",
    "reihe",
    "serie",
    "series",
    "episode",
    "chapter",
    "kapitel",
];

/// Two-token noise dropped from the comparison form
const NOISE_PHRASES: &[(&str, &str)] = &[("graphic", "audio"), ("dramatized", "adaptation")];

/// Search form: noise removed, cut at the first colon or " - ".
pub fn clean_title(raw: &str) -> String {
    let stripped = FORMAT_NOISE.replace_all(raw, "");
    let head = stripped.split(':').next().unwrap_or("");
    let head = head.split(" - ").next().unwrap_or("");
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison form: lowercase alphanumeric tokens, numbers as digits,
/// structural noise removed. Idempotent.
pub fn normalize_title(raw: &str) -> String {
    let without_brackets = BRACKETED.replace_all(raw, " ");
    let lowered: String = without_brackets
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = lowered
        .split_whitespace()
        .map(|token| {
            NUMBER_WORDS
                .iter()
                .find(|(word, _)| *word == token)
                .map(|(_, digit)| *digit)
                .unwrap_or(token)
        })
        .collect();

    // Dropping a token can make a phrase adjacent, so run to a fixpoint
    loop {
        let before = tokens.len();
        tokens = strip_noise(&tokens);
        if tokens.len() == before {
            break;
        }
    }

    tokens.join(" ")
}

fn strip_noise<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let mut kept = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        if let Some(next) = tokens.get(i + 1) {
            if NOISE_PHRASES
                .iter()
                .any(|(first, second)| *first == token && second == next)
            {
                i += 2;
                continue;
            }
        }
        if !NOISE_WORDS.contains(&token) {
            kept.push(token);
        }
        i += 1;
    }
    kept
}

/// Volume/sequence numbers mentioned in a title.
///
/// Explicit markers (`book 3`, `vol. 2`, `#4`, ...) plus a bare trailing
/// integer. Values stay strings, so "01" and "1" are distinct.
pub fn extract_volume_numbers(text: &str) -> BTreeSet<String> {
    let mut numbers: BTreeSet<String> = VOLUME_MARKER
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    if let Some(caps) = TRAILING_NUMBER.captures(text.trim()) {
        if let Some(m) = caps.get(1) {
            numbers.insert(m.as_str().to_string());
        }
    }

    numbers
}

/// True when either side has no volume numbers or the sets share one
pub fn volumes_compatible(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    a.is_empty() || b.is_empty() || !a.is_disjoint(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_strips_noise_and_subtitle() {
        assert_eq!(clean_title("The Hobbit (Unabridged)"), "The Hobbit");
        assert_eq!(
            clean_title("Mistborn: The Final Empire [Graphic Audio]"),
            "Mistborn"
        );
        assert_eq!(clean_title("Dune - Der Wüstenplanet"), "Dune");
        assert_eq!(clean_title(""), "");
    }

    #[test]
    fn test_normalize_maps_numbers_and_drops_structure() {
        assert_eq!(
            normalize_title("The Expanse, Book Three: Abaddon's Gate"),
            "the expanse 3 abaddon s gate"
        );
        assert_eq!(normalize_title("Die Zwerge, Band Zwei"), "die zwerge 2");
        assert_eq!(normalize_title("FÜNF Freunde"), "5 freunde");
    }

    #[test]
    fn test_normalize_drops_phrase_made_adjacent() {
        // "book" sits between the phrase tokens on the first pass
        let once = normalize_title("Graphic Book Audio Edition");
        assert_eq!(once, "edition");
        assert_eq!(normalize_title(&once), once);
    }

    #[test]
    fn test_normalize_idempotent_samples() {
        for raw in [
            "The Way of Kings (Part 1) [Dramatized Adaptation]",
            "Harry Potter und der Stein der Weisen - Band Eins",
            "Vol. 10: Côte d'Azur #3",
            "  ---  ",
            "one two three",
        ] {
            let once = normalize_title(raw);
            assert_eq!(normalize_title(&once), once, "input: {raw}");
        }
    }

    #[test]
    fn test_extract_volume_numbers() {
        let expected: BTreeSet<String> = ["3".to_string()].into_iter().collect();
        assert_eq!(extract_volume_numbers("Series Book 3"), expected);

        let nums = extract_volume_numbers("Series, Vol. 10");
        assert!(nums.contains("10"));
        assert_eq!(nums.len(), 1);

        let nums = extract_volume_numbers("Saga #4, Part 2");
        assert!(nums.contains("4"));
        assert!(nums.contains("2"));

        assert!(extract_volume_numbers("The Hobbit").is_empty());
    }

    #[test]
    fn test_volumes_compatible() {
        let three = extract_volume_numbers("Series Book 3");
        let ten = extract_volume_numbers("Series, Vol. 10");
        let none = extract_volume_numbers("Series");

        assert!(!volumes_compatible(&three, &ten));
        assert!(volumes_compatible(&three, &none));
        assert!(volumes_compatible(&three, &extract_volume_numbers("Book 3")));
    }
}
