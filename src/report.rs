//! Full analysis of one track collection.
//!
//! Every detector sees the same collection and none depends on another's
//! output, so the report is just their results side by side.

use serde::Serialize;
use std::collections::HashMap;

use crate::audio::find_audio_duplicates;
use crate::cluster::cluster;
use crate::config::AnalysisConfig;
use crate::duplicates::{find_exact_duplicates, find_versions};
use crate::error::Result;
use crate::models::{AudioDuplicatePair, ClusterMap, SimilarityPair, Track};
use crate::similarity::find_similar;
use crate::stats::{genre_histogram, summarize, taste_profile, Statistics, TasteProfile};

#[derive(Debug, Serialize)]
pub struct AnalysisReport<'a> {
    pub config: AnalysisConfig,
    pub exact_duplicates: Vec<&'a Track>,
    pub versions: Vec<&'a Track>,
    pub similar_pairs: Vec<SimilarityPair<'a>>,
    pub clusters: ClusterMap<'a>,
    pub audio_duplicates: Vec<AudioDuplicatePair<'a>>,
    pub statistics: Statistics,
    /// `None` when no track carries audio descriptors
    pub taste_profile: Option<TasteProfile>,
    /// (genre, count), empty without artist genre data
    pub genres: Vec<(String, usize)>,
}

impl AnalysisReport<'_> {
    /// True when no detector found anything worth acting on.
    pub fn is_clean(&self) -> bool {
        self.exact_duplicates.is_empty()
            && self.versions.is_empty()
            && self.similar_pairs.is_empty()
            && self.clusters.is_empty()
            && self.audio_duplicates.is_empty()
    }
}

/// Run every detector and aggregator over `tracks`.
///
/// `artist_genres` maps artist id to that artist's genres; pass an empty map
/// when genre data is unavailable.
pub fn analyze<'a>(
    tracks: &'a [Track],
    config: &AnalysisConfig,
    artist_genres: &HashMap<String, Vec<String>>,
) -> Result<AnalysisReport<'a>> {
    config.validate()?;

    // The two quadratic passes run side by side
    let (similar_pairs, clusters) = rayon::join(
        || find_similar(tracks, config.similarity_threshold),
        || cluster(tracks, config.similarity_threshold),
    );

    let report = AnalysisReport {
        config: *config,
        exact_duplicates: find_exact_duplicates(tracks),
        versions: find_versions(tracks),
        similar_pairs: similar_pairs?,
        clusters: clusters?,
        audio_duplicates: find_audio_duplicates(tracks, config.audio_threshold)?,
        statistics: summarize(tracks),
        taste_profile: taste_profile(tracks),
        genres: genre_histogram(tracks, artist_genres),
    };

    tracing::info!(
        "analyzed {} tracks: {} exact, {} versions, {} similar pairs, {} clusters, {} audio pairs",
        tracks.len(),
        report.exact_duplicates.len(),
        report.versions.len(),
        report.similar_pairs.len(),
        report.clusters.len(),
        report.audio_duplicates.len()
    );
    Ok(report)
}
