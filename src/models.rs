//! Core data models for library analysis.
//!
//! Tracks are value structs with their normalized title computed once at
//! construction. Result records borrow from the analyzed collection and live
//! only as long as the run that produced them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::normalize::normalize_title;

// ============================================================================
// Sources
// ============================================================================

/// Cache key for the user's saved/liked tracks.
pub const LIKED_SONGS_SOURCE: &str = "liked_songs";

static PLAYLIST_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"playlist/([A-Za-z0-9]+)").unwrap());
static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

/// Source id for a playlist, given its share URL or bare id.
/// e.g. "https://open.spotify.com/playlist/37i9dQZF1DX?si=ab" → "playlist_37i9dQZF1DX"
pub fn playlist_source_id(url_or_id: &str) -> Option<String> {
    let trimmed = url_or_id.trim();
    if let Some(caps) = PLAYLIST_ID.captures(trimmed) {
        return Some(format!("playlist_{}", &caps[1]));
    }
    if BARE_ID.is_match(trimmed) {
        return Some(format!("playlist_{}", trimmed));
    }
    None
}

// ============================================================================
// Audio Descriptors
// ============================================================================

/// The recognized numeric audio descriptors, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureName {
    Danceability,
    Energy,
    Valence,
    Acousticness,
    Instrumentalness,
    Liveness,
    Speechiness,
}

impl FeatureName {
    pub const ALL: [FeatureName; 7] = [
        FeatureName::Danceability,
        FeatureName::Energy,
        FeatureName::Valence,
        FeatureName::Acousticness,
        FeatureName::Instrumentalness,
        FeatureName::Liveness,
        FeatureName::Speechiness,
    ];

    /// Column / JSON key name
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureName::Danceability => "danceability",
            FeatureName::Energy => "energy",
            FeatureName::Valence => "valence",
            FeatureName::Acousticness => "acousticness",
            FeatureName::Instrumentalness => "instrumentalness",
            FeatureName::Liveness => "liveness",
            FeatureName::Speechiness => "speechiness",
        }
    }
}

/// Audio descriptors for one track. Any subset may be absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub valence: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub speechiness: Option<f64>,
}

impl AudioFeatures {
    pub fn get(&self, name: FeatureName) -> Option<f64> {
        let value = match name {
            FeatureName::Danceability => self.danceability,
            FeatureName::Energy => self.energy,
            FeatureName::Valence => self.valence,
            FeatureName::Acousticness => self.acousticness,
            FeatureName::Instrumentalness => self.instrumentalness,
            FeatureName::Liveness => self.liveness,
            FeatureName::Speechiness => self.speechiness,
        };
        // NaN counts as missing
        value.filter(|v| v.is_finite())
    }

    pub fn set(&mut self, name: FeatureName, value: Option<f64>) {
        let slot = match name {
            FeatureName::Danceability => &mut self.danceability,
            FeatureName::Energy => &mut self.energy,
            FeatureName::Valence => &mut self.valence,
            FeatureName::Acousticness => &mut self.acousticness,
            FeatureName::Instrumentalness => &mut self.instrumentalness,
            FeatureName::Liveness => &mut self.liveness,
            FeatureName::Speechiness => &mut self.speechiness,
        };
        *slot = value;
    }

    /// Usable descriptors in canonical order
    pub fn present(&self) -> impl Iterator<Item = (FeatureName, f64)> + '_ {
        FeatureName::ALL
            .into_iter()
            .filter_map(move |name| self.get(name).map(|v| (name, v)))
    }

    pub fn present_count(&self) -> usize {
        self.present().count()
    }

    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }
}

// ============================================================================
// Track
// ============================================================================

/// One entry of a source's track collection.
///
/// `artists` and `artist_ids` are parallel: same length, same credited order.
/// `added_at` is the provider's ISO-8601 timestamp string, which sorts
/// chronologically as text. The title is only reachable through `title()` and
/// `set_title()` so its normalized form cannot go stale.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    title: String,
    pub artists: Vec<String>,
    pub artist_ids: Vec<String>,
    pub album: Option<String>,
    pub release_date: Option<String>,
    pub duration_ms: u64,
    pub added_at: String,
    pub external_url: Option<String>,
    pub audio_features: AudioFeatures,
    normalized_title: String,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        let normalized_title = normalize_title(&title);
        Self {
            id: id.into(),
            title,
            artists: Vec::new(),
            artist_ids: Vec::new(),
            album: None,
            release_date: None,
            duration_ms: 0,
            added_at: String::new(),
            external_url: None,
            audio_features: AudioFeatures::default(),
            normalized_title,
        }
    }

    pub fn with_artist(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.artist_ids.push(id.into());
        self.artists.push(name.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>, release_date: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self.release_date = Some(release_date.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_added_at(mut self, added_at: impl Into<String>) -> Self {
        self.added_at = added_at.into();
        self
    }

    pub fn with_features(mut self, features: AudioFeatures) -> Self {
        self.audio_features = features;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Replace the title and recompute its normalized form.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.normalized_title = normalize_title(&self.title);
    }

    /// Normalized title, kept in step with `title`
    pub fn normalized_title(&self) -> &str {
        &self.normalized_title
    }

    /// Artist names joined in credited order, e.g. "Artist A, Artist B"
    pub fn artist_display(&self) -> String {
        self.artists.join(", ")
    }
}

// ============================================================================
// Analysis Results
// ============================================================================

/// Two tracks whose normalized titles fuzzy-match.
#[derive(Clone, Debug, Serialize)]
pub struct SimilarityPair<'a> {
    pub first: &'a Track,
    pub second: &'a Track,
    /// 0-100
    pub score: u32,
}

/// Two tracks whose shared audio descriptors are nearly identical.
#[derive(Clone, Debug, Serialize)]
pub struct AudioDuplicatePair<'a> {
    pub first: &'a Track,
    pub second: &'a Track,
    pub mean_difference: f64,
    pub shared_features: usize,
}

/// Cluster label → member tracks (always 2 or more).
pub type ClusterMap<'a> = BTreeMap<usize, Vec<&'a Track>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_source_id() {
        assert_eq!(
            playlist_source_id("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=abc123"),
            Some("playlist_37i9dQZF1DXcBWIGoYBM5M".to_string())
        );
        assert_eq!(
            playlist_source_id("https://open.spotify.com/intl-de/playlist/abc"),
            Some("playlist_abc".to_string())
        );
        assert_eq!(playlist_source_id("abc123"), Some("playlist_abc123".to_string()));
        assert_eq!(playlist_source_id("https://open.spotify.com/track/"), None);
        assert_eq!(playlist_source_id(""), None);
    }

    #[test]
    fn test_track_builder_keeps_artists_parallel() {
        let track = Track::new("t1", "Song (Live)")
            .with_artist("a1", "Artist A")
            .with_artist("a2", "Artist B");
        assert_eq!(track.artists.len(), track.artist_ids.len());
        assert_eq!(track.artist_display(), "Artist A, Artist B");
        assert_eq!(track.normalized_title(), "song");
    }

    #[test]
    fn test_set_title_renormalizes() {
        let mut track = Track::new("t1", "Song (Live)");
        track.set_title("Other Song - Remastered");
        assert_eq!(track.title(), "Other Song - Remastered");
        assert_eq!(track.normalized_title(), "other song");
        assert_eq!(track, Track::new("t1", "Other Song - Remastered"));
    }

    #[test]
    fn test_audio_features_present() {
        let mut features = AudioFeatures::default();
        assert!(features.is_empty());
        features.set(FeatureName::Energy, Some(0.4));
        features.set(FeatureName::Valence, Some(f64::NAN));
        let present: Vec<_> = features.present().collect();
        assert_eq!(present, vec![(FeatureName::Energy, 0.4)]);
        assert_eq!(features.get(FeatureName::Valence), None);
    }
}
