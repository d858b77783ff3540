//! Provider records → Track.
//!
//! The track source hands over saved-item records shaped like the Spotify
//! Web API (`{added_at, track: {...}}`) plus separate audio-feature records.
//! Records that fail to parse, or lack an id or title, are dropped and
//! counted; nothing here fails.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::{AudioFeatures, FeatureName, Track};

#[derive(Debug, Clone, Deserialize)]
pub struct RawSavedItem {
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub track: Option<RawTrack>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrack {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub artists: Vec<RawArtist>,
    pub album: Option<RawAlbum>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub external_urls: Option<RawExternalUrls>,
    #[serde(default)]
    pub external_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArtist {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAlbum {
    pub name: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExternalUrls {
    pub spotify: Option<String>,
}

/// Prefix for artists the provider credits without an id (local files).
pub const LOCAL_ARTIST_PREFIX: &str = "local:";

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Audio-feature record as returned per track id.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAudioFeatures {
    pub id: Option<String>,
    #[serde(flatten)]
    pub features: AudioFeatures,
}

/// Result of normalizing a batch of provider records.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub tracks: Vec<Track>,
    /// Records dropped for a bad shape, a null track payload, a missing id
    /// or a missing title
    pub dropped: usize,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Convert one saved item, or `None` if it is malformed.
pub fn normalize_record(item: RawSavedItem) -> Option<Track> {
    let raw = item.track?;
    let id = non_empty(raw.id)?;
    let title = non_empty(raw.name)?;

    let mut track = Track::new(id, title);
    for artist in raw.artists {
        let Some(name) = non_empty(artist.name) else {
            continue;
        };
        // Keep names and ids parallel: unidentified artists get a name-derived id
        let artist_id = non_empty(artist.id).unwrap_or_else(|| format!("{LOCAL_ARTIST_PREFIX}{name}"));
        track = track.with_artist(artist_id, name);
    }
    if let Some(album) = raw.album {
        track.album = album.name;
        track.release_date = album.release_date;
    }
    track.duration_ms = raw.duration_ms.unwrap_or(0);
    track.added_at = item.added_at.unwrap_or_default();
    track.external_url = raw
        .external_urls
        .and_then(|urls| urls.spotify)
        .or(raw.external_url);
    Some(track)
}

/// Normalize a batch of untyped provider records, preserving provider order.
/// Each record is parsed on its own, so one bad shape only costs that record.
pub fn normalize_records(items: Vec<Value>) -> IngestOutcome {
    let total = items.len();
    let tracks: Vec<Track> = items
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawSavedItem>(value) {
            Ok(item) => normalize_record(item),
            Err(err) => {
                tracing::debug!("unparsable saved item: {}", err);
                None
            }
        })
        .collect();
    let dropped = total - tracks.len();
    if dropped > 0 {
        tracing::warn!("dropped {} malformed records of {}", dropped, total);
    }
    tracing::debug!("normalized {} tracks", tracks.len());
    IngestOutcome { tracks, dropped }
}

/// Attach audio features to tracks by id. Null records and unknown ids are
/// ignored. Returns the number of tracks that received features.
pub fn merge_audio_features(tracks: &mut [Track], records: Vec<Option<RawAudioFeatures>>) -> usize {
    let mut by_id: FxHashMap<String, AudioFeatures> = FxHashMap::default();
    for record in records.into_iter().flatten() {
        if let Some(id) = non_empty(record.id) {
            by_id.insert(id, sanitize(record.features));
        }
    }

    let mut enriched = 0;
    for track in tracks.iter_mut() {
        if let Some(features) = by_id.get(&track.id) {
            track.audio_features = *features;
            enriched += 1;
        }
    }
    if enriched < tracks.len() {
        tracing::debug!(
            "audio features missing for {} of {} tracks",
            tracks.len() - enriched,
            tracks.len()
        );
    }
    enriched
}

/// Descriptors outside [0, 1] are provider noise; treat them as absent.
fn sanitize(mut features: AudioFeatures) -> AudioFeatures {
    for name in FeatureName::ALL {
        let value = features.get(name).filter(|v| (0.0..=1.0).contains(v));
        features.set(name, value);
    }
    features
}
