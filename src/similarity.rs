//! Pairwise fuzzy matching of normalized titles.
//!
//! Scores are integer percentages built on `strsim`'s normalized Levenshtein
//! similarity:
//! - `ratio`: plain string similarity
//! - `token_sort_ratio`: similarity after sorting tokens
//! - `token_set_ratio`: order-independent overlap (a title whose words are a
//!   subset of the other's scores 100)
//!
//! Every unordered pair is compared once, so matching is O(n²). Rows are
//! spread over rayon's pool; output order is still row-major.

use rayon::prelude::*;
use std::collections::BTreeSet;

use crate::error::{check_percent, Result};
use crate::models::{SimilarityPair, Track};

// ============================================================================
// Ratios
// ============================================================================

/// String similarity in 0-100. Empty input scores 0.
pub fn ratio(a: &str, b: &str) -> u32 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    (strsim::normalized_levenshtein(a, b) * 100.0).round() as u32
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

pub fn token_sort_ratio(a: &str, b: &str) -> u32 {
    ratio(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
}

pub fn token_set_ratio(a: &str, b: &str) -> u32 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0;
    }

    let intersection = join_tokens(tokens_a.intersection(&tokens_b));
    let only_a = join_tokens(tokens_a.difference(&tokens_b));
    let only_b = join_tokens(tokens_b.difference(&tokens_a));

    let combined_a = format!("{} {}", intersection, only_a).trim().to_string();
    let combined_b = format!("{} {}", intersection, only_b).trim().to_string();

    ratio(&intersection, &combined_a)
        .max(ratio(&intersection, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

fn join_tokens<'a, 'b: 'a>(tokens: impl Iterator<Item = &'a &'b str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

/// Title match score: the better of the token-sort and token-set ratios.
pub fn title_score(a: &str, b: &str) -> u32 {
    token_sort_ratio(a, b).max(token_set_ratio(a, b))
}

// ============================================================================
// Matching
// ============================================================================

/// Every unordered pair (i < j) whose normalized titles score at least
/// `threshold` (0-100). Transitive matches are not merged; see `cluster`.
pub fn find_similar(tracks: &[Track], threshold: u32) -> Result<Vec<SimilarityPair<'_>>> {
    check_percent("similarity_threshold", threshold)?;

    let n = tracks.len();
    let pairs: Vec<SimilarityPair<'_>> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            (i + 1..n).filter_map(move |j| {
                let first = &tracks[i];
                let second = &tracks[j];
                let score = title_score(first.normalized_title(), second.normalized_title());
                (score >= threshold).then_some(SimilarityPair {
                    first,
                    second,
                    score,
                })
            })
        })
        .collect();

    tracing::debug!(
        "pairwise matching: {} pairs >= {} among {} tracks",
        pairs.len(),
        threshold,
        n
    );
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(titles: &[&str]) -> Vec<Track> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| Track::new(format!("t{i}"), *t).with_artist("a", "Artist A"))
            .collect()
    }

    #[test]
    fn test_ratio_bounds() {
        assert_eq!(ratio("song", "song"), 100);
        assert_eq!(ratio("", "song"), 0);
        assert_eq!(ratio("", ""), 0);
        assert!(ratio("abc", "xyz") < 10);
    }

    #[test]
    fn test_token_sort_ignores_order() {
        assert_eq!(token_sort_ratio("new york new", "new new york"), 100);
        assert_eq!(token_sort_ratio("hello world", "world hello"), 100);
    }

    #[test]
    fn test_token_set_subset_scores_100() {
        assert_eq!(token_set_ratio("song", "song someone"), 100);
        assert_eq!(token_set_ratio("fuzzy was a bear", "fuzzy fuzzy was a bear"), 100);
        assert_eq!(token_set_ratio("", "song"), 0);
    }

    #[test]
    fn test_token_set_unrelated_is_low() {
        assert!(token_set_ratio("yesterday", "bohemian rhapsody") < 50);
    }

    #[test]
    fn test_identical_titles_one_pair_at_100() {
        let tracks = titled(&["Song", "Song"]);
        let pairs = find_similar(&tracks, 85).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].score, 100);
        assert_eq!(pairs[0].first.id, "t0");
        assert_eq!(pairs[0].second.id, "t1");
    }

    #[test]
    fn test_live_variant_scores_100() {
        let tracks = titled(&["Song (Live)", "Song"]);
        let pairs = find_similar(&tracks, 100).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].score, 100);
    }

    #[test]
    fn test_no_self_pairs_and_each_pair_once() {
        let tracks = titled(&["Song", "Song", "Song"]);
        let pairs = find_similar(&tracks, 0).unwrap();
        assert_eq!(pairs.len(), 3);
        for pair in &pairs {
            assert_ne!(pair.first.id, pair.second.id);
            assert!(pair.first.id < pair.second.id);
        }
    }

    #[test]
    fn test_threshold_monotonic() {
        let tracks = titled(&[
            "Hey Jude",
            "Hey Jude (Remastered)",
            "Hey Judy",
            "Let It Be",
            "Let It Be Naked",
            "Something",
            "Something Else",
        ]);
        let mut previous: Option<Vec<(String, String)>> = None;
        for threshold in [100, 90, 80, 70, 50, 30, 0] {
            let current: Vec<(String, String)> = find_similar(&tracks, threshold)
                .unwrap()
                .iter()
                .map(|p| (p.first.id.clone(), p.second.id.clone()))
                .collect();
            if let Some(prev) = &previous {
                assert!(prev.iter().all(|p| current.contains(p)));
            }
            previous = Some(current);
        }
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let tracks = titled(&["A", "B"]);
        let err = find_similar(&tracks, 101).unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));
    }

    #[test]
    fn test_small_inputs() {
        assert!(find_similar(&[], 85).unwrap().is_empty());
        assert!(find_similar(&titled(&["Solo"]), 85).unwrap().is_empty());
    }
}
