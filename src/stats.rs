//! Descriptive statistics over a track collection.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::models::{FeatureName, Track};

pub const TOP_ARTISTS: usize = 5;
pub const TOP_YEARS: usize = 5;
pub const TOP_GENRES: usize = 10;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// "2019", "2019-05" or "2019-05-03"
static RELEASE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(?:-(\d{2})(?:-(\d{2}))?)?$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// (artist name, appearances), most frequent first
    pub top_artists: Vec<(String, usize)>,
    /// (release year, tracks), most frequent first
    pub top_years: Vec<(i32, usize)>,
    pub total_duration_hours: f64,
    pub track_count: usize,
    /// Distinct artist ids across all tracks
    pub unique_artists: usize,
}

/// Mean of each descriptor over the tracks that carry it.
pub type TasteProfile = BTreeMap<FeatureName, f64>;

/// Year of a provider release date, at year, month or day precision.
/// Anything else, including impossible dates, yields `None`.
pub fn release_year(date: &str) -> Option<i32> {
    let caps = RELEASE_DATE.captures(date.trim())?;
    let year: i32 = caps[1].parse().ok()?;
    match (caps.get(2), caps.get(3)) {
        (None, _) => Some(year),
        (Some(month), None) => {
            let month: u32 = month.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, 1).map(|_| year)
        }
        (Some(month), Some(day)) => {
            let month: u32 = month.as_str().parse().ok()?;
            let day: u32 = day.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day).map(|_| year)
        }
    }
}

/// Count descending, ties broken by key ascending, truncated to `limit`.
fn rank<K: Ord + Hash>(counts: FxHashMap<K, usize>, limit: usize) -> Vec<(K, usize)> {
    let mut ranked: Vec<(K, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

pub fn summarize(tracks: &[Track]) -> Statistics {
    let mut artist_counts: FxHashMap<String, usize> = FxHashMap::default();
    let mut year_counts: FxHashMap<i32, usize> = FxHashMap::default();
    let mut artist_ids: FxHashSet<&str> = FxHashSet::default();
    let mut total_ms: u64 = 0;

    for track in tracks {
        // Flattened credits: a duet counts once for each artist
        for name in &track.artists {
            *artist_counts.entry(name.clone()).or_default() += 1;
        }
        artist_ids.extend(track.artist_ids.iter().map(String::as_str));
        if let Some(year) = track.release_date.as_deref().and_then(release_year) {
            *year_counts.entry(year).or_default() += 1;
        }
        total_ms += track.duration_ms;
    }

    Statistics {
        top_artists: rank(artist_counts, TOP_ARTISTS),
        top_years: rank(year_counts, TOP_YEARS),
        total_duration_hours: total_ms as f64 / MS_PER_HOUR,
        track_count: tracks.len(),
        unique_artists: artist_ids.len(),
    }
}

/// Mean of every descriptor that has at least one usable value, or `None`
/// when no track carries any descriptor.
pub fn taste_profile(tracks: &[Track]) -> Option<TasteProfile> {
    let mut sums: BTreeMap<FeatureName, (f64, usize)> = BTreeMap::new();
    for track in tracks {
        for (name, value) in track.audio_features.present() {
            let entry = sums.entry(name).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    if sums.is_empty() {
        return None;
    }
    Some(
        sums.into_iter()
            .map(|(name, (sum, count))| (name, sum / count as f64))
            .collect(),
    )
}

/// Top genres across the collection.
///
/// Each track's artists are expanded through `artist_genres`; an artist adds
/// its genres once per track it is credited on. Unknown artists add nothing.
pub fn genre_histogram(
    tracks: &[Track],
    artist_genres: &HashMap<String, Vec<String>>,
) -> Vec<(String, usize)> {
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    for track in tracks {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for artist_id in &track.artist_ids {
            if !seen.insert(artist_id.as_str()) {
                continue;
            }
            for genre in artist_genres.get(artist_id).into_iter().flatten() {
                *counts.entry(genre.clone()).or_default() += 1;
            }
        }
    }
    rank(counts, TOP_GENRES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioFeatures;

    #[test]
    fn test_release_year() {
        assert_eq!(release_year("2019"), Some(2019));
        assert_eq!(release_year("2019-05"), Some(2019));
        assert_eq!(release_year("2019-05-03"), Some(2019));
        assert_eq!(release_year("2019-13"), None);
        assert_eq!(release_year("2019-02-30"), None);
        assert_eq!(release_year("unknown"), None);
        assert_eq!(release_year(""), None);
    }

    #[test]
    fn test_summarize_counts_flattened_artists() {
        let tracks = vec![
            Track::new("1", "A")
                .with_artist("x", "X")
                .with_artist("y", "Y")
                .with_album("Al", "2001-01-01")
                .with_duration_ms(1_800_000),
            Track::new("2", "B")
                .with_artist("x", "X")
                .with_album("Al", "2001")
                .with_duration_ms(1_800_000),
            Track::new("3", "C")
                .with_artist("z", "Z")
                .with_album("Bl", "not a date")
                .with_duration_ms(3_600_000),
        ];
        let stats = summarize(&tracks);
        assert_eq!(
            stats.top_artists,
            vec![("X".to_string(), 2), ("Y".to_string(), 1), ("Z".to_string(), 1)]
        );
        assert_eq!(stats.top_years, vec![(2001, 2)]);
        assert!((stats.total_duration_hours - 2.0).abs() < 1e-9);
        assert_eq!(stats.track_count, 3);
        assert_eq!(stats.unique_artists, 3);
    }

    #[test]
    fn test_top_artists_limited_to_five() {
        let tracks: Vec<Track> = (0..8)
            .map(|i| Track::new(i.to_string(), "T").with_artist(format!("a{i}"), format!("Artist {i}")))
            .collect();
        assert_eq!(summarize(&tracks).top_artists.len(), TOP_ARTISTS);
    }

    #[test]
    fn test_summarize_empty() {
        let stats = summarize(&[]);
        assert!(stats.top_artists.is_empty());
        assert!(stats.top_years.is_empty());
        assert_eq!(stats.track_count, 0);
        assert_eq!(stats.total_duration_hours, 0.0);
    }

    #[test]
    fn test_taste_profile_means_present_values() {
        let tracks = vec![
            Track::new("1", "A").with_features(AudioFeatures {
                energy: Some(0.2),
                valence: Some(0.9),
                ..Default::default()
            }),
            Track::new("2", "B").with_features(AudioFeatures {
                energy: Some(0.4),
                ..Default::default()
            }),
            Track::new("3", "C"),
        ];
        let profile = taste_profile(&tracks).unwrap();
        assert_eq!(profile.len(), 2);
        assert!((profile[&FeatureName::Energy] - 0.3).abs() < 1e-9);
        assert!((profile[&FeatureName::Valence] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_taste_profile_none_without_features() {
        assert_eq!(taste_profile(&[Track::new("1", "A")]), None);
        assert_eq!(taste_profile(&[]), None);
    }

    #[test]
    fn test_genre_histogram() {
        let mut genres = HashMap::new();
        genres.insert("x".to_string(), vec!["rock".to_string(), "indie".to_string()]);
        genres.insert("y".to_string(), vec!["rock".to_string()]);
        let tracks = vec![
            Track::new("1", "A").with_artist("x", "X"),
            Track::new("2", "B").with_artist("x", "X").with_artist("y", "Y"),
            Track::new("3", "C").with_artist("unknown", "U"),
        ];
        assert_eq!(
            genre_histogram(&tracks, &genres),
            vec![("rock".to_string(), 3), ("indie".to_string(), 2)]
        );
    }

    #[test]
    fn test_genre_histogram_top_ten() {
        let genres: HashMap<String, Vec<String>> = [(
            "x".to_string(),
            (0..15).map(|i| format!("genre{i:02}")).collect(),
        )]
        .into_iter()
        .collect();
        let tracks = vec![Track::new("1", "A").with_artist("x", "X")];
        let histogram = genre_histogram(&tracks, &genres);
        assert_eq!(histogram.len(), TOP_GENRES);
        assert_eq!(histogram[0], ("genre00".to_string(), 1));
    }
}
