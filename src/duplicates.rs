//! Identity-based duplicate detection: exact (title, artists) repeats and
//! re-added copies of the same track id.

use rustc_hash::FxHashMap;

use crate::models::Track;

/// Every track whose raw title and joined artist names occur more than once.
///
/// All occurrences are returned, in collection order. Comparison is exact and
/// case-sensitive; use the fuzzy matcher for anything looser.
pub fn find_exact_duplicates(tracks: &[Track]) -> Vec<&Track> {
    let keys: Vec<(&str, String)> = tracks
        .iter()
        .map(|t| (t.title(), t.artist_display()))
        .collect();

    let mut counts: FxHashMap<(&str, &str), usize> = FxHashMap::default();
    for (title, artists) in &keys {
        *counts.entry((*title, artists.as_str())).or_default() += 1;
    }

    tracks
        .iter()
        .zip(&keys)
        .filter(|(_, (title, artists))| counts[&(*title, artists.as_str())] > 1)
        .map(|(track, _)| track)
        .collect()
}

/// Every track whose id occurs more than once, ordered by id then `added_at`.
pub fn find_versions(tracks: &[Track]) -> Vec<&Track> {
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    for track in tracks {
        *counts.entry(track.id.as_str()).or_default() += 1;
    }

    let mut versions: Vec<&Track> = tracks
        .iter()
        .filter(|t| counts[t.id.as_str()] > 1)
        .collect();
    // Stable sort keeps provider order for identical timestamps
    versions.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.added_at.cmp(&b.added_at)));
    versions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, title: &str, artist: &str) -> Track {
        Track::new(id, title).with_artist(format!("id-{artist}"), artist)
    }

    #[test]
    fn test_identical_pair_both_returned() {
        let tracks = vec![track("t1", "Song", "Artist A"), track("t2", "Song", "Artist A")];
        let dupes = find_exact_duplicates(&tracks);
        assert_eq!(dupes.len(), 2);
        assert_eq!(dupes[0].id, "t1");
        assert_eq!(dupes[1].id, "t2");
    }

    #[test]
    fn test_exact_match_is_case_sensitive_and_raw() {
        let tracks = vec![
            track("t1", "Song", "Artist A"),
            track("t2", "song", "Artist A"),
            track("t3", "Song (Live)", "Artist A"),
            track("t4", "Song", "Artist B"),
        ];
        assert!(find_exact_duplicates(&tracks).is_empty());
    }

    #[test]
    fn test_artist_order_matters() {
        let a = Track::new("t1", "Duet").with_artist("a", "A").with_artist("b", "B");
        let b = Track::new("t2", "Duet").with_artist("b", "B").with_artist("a", "A");
        let c = Track::new("t3", "Duet").with_artist("a", "A").with_artist("b", "B");
        let tracks = vec![a, b, c];
        let ids: Vec<&str> = find_exact_duplicates(&tracks).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
    }

    #[test]
    fn test_three_copies_all_returned() {
        let tracks = vec![
            track("t1", "X", "A"),
            track("t2", "Y", "A"),
            track("t3", "X", "A"),
            track("t4", "X", "A"),
        ];
        let ids: Vec<&str> = find_exact_duplicates(&tracks).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3", "t4"]);
    }

    #[test]
    fn test_versions_ordered_by_id_then_added_at() {
        let tracks = vec![
            track("b", "Song", "A").with_added_at("2023-03-01T00:00:00Z"),
            track("a", "Other", "A").with_added_at("2022-01-01T00:00:00Z"),
            track("b", "Song", "A").with_added_at("2021-06-01T00:00:00Z"),
            track("c", "Solo", "A").with_added_at("2020-01-01T00:00:00Z"),
            track("a", "Other", "A").with_added_at("2020-01-01T00:00:00Z"),
            track("b", "Song", "A").with_added_at("2022-02-01T00:00:00Z"),
        ];
        let versions = find_versions(&tracks);
        let got: Vec<(&str, &str)> = versions
            .iter()
            .map(|t| (t.id.as_str(), t.added_at.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("a", "2020-01-01T00:00:00Z"),
                ("a", "2022-01-01T00:00:00Z"),
                ("b", "2021-06-01T00:00:00Z"),
                ("b", "2022-02-01T00:00:00Z"),
                ("b", "2023-03-01T00:00:00Z"),
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(find_exact_duplicates(&[]).is_empty());
        assert!(find_versions(&[]).is_empty());
    }
}
