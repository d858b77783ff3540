//! Title normalization shared by every title-based detector.
//!
//! CRITICAL: pairwise matching and clustering both compare normalized titles.
//! Any change here shifts both result sets. `normalize_title` must stay
//! idempotent.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// NOISE VOCABULARY
// ============================================================================

/// Release/credit qualifiers that say nothing about which song a title is.
/// Removed wherever they appear as a whole word, bracketed or not.
pub const NOISE_WORDS: &[&str] = &[
    "feat",
    "featuring",
    "ft",
    "prod",
    "producer",
    "remix",
    "remastered",
    "live",
    "acoustic",
    "version",
    "edit",
    "original",
    "radio",
    "mix",
    "extended",
    "official",
    "music",
    "video",
    "studio",
    "deluxe",
    "anniversary",
    "edition",
];

static NOISE_SET: Lazy<FxHashSet<&'static str>> = Lazy::new(|| NOISE_WORDS.iter().copied().collect());

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Anything that is not a lowercase ASCII letter, digit or whitespace
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]+").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII: NFKD, drop combining marks, then
/// transliterate whatever is left.
/// e.g., "Beyoncé" → "beyonce", "Motörhead" → "motorhead"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Straighten curly quotes and spell out a spaced ampersand.
pub fn normalize_punctuation(s: &str) -> String {
    let result = s
        .replace(['\u{2018}', '\u{2019}', '\u{00B4}', '\u{0060}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(" & ", " and ");
    MULTI_SPACE.replace_all(&result, " ").to_string()
}

pub fn is_noise_word(word: &str) -> bool {
    NOISE_SET.contains(word)
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize a title for fuzzy comparison.
///
/// Lower-cases and folds to ASCII, drops apostrophes ("Don't" → "dont"),
/// turns every other character outside `[a-z0-9]` into a space, removes
/// noise words and collapses whitespace.
///
/// `normalize_title("Song (Remix)") == normalize_title("song remix") == "song"`
pub fn normalize_title(title: &str) -> String {
    let folded = fold_to_ascii(&normalize_punctuation(title)).replace('\'', "");
    let cleaned = NON_ALNUM.replace_all(&folded, " ");
    cleaned
        .split_whitespace()
        .filter(|word| !is_noise_word(word))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================
