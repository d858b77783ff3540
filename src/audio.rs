//! Duplicate detection from audio descriptors.
//!
//! Two tracks are compared only on descriptors both of them carry, and only
//! when both carry the same number of descriptors. Titles play no part: covers
//! can match acoustically while same-titled remasters may not.

use rayon::prelude::*;

use crate::config::check_audio_threshold;
use crate::error::Result;
use crate::models::{AudioDuplicatePair, AudioFeatures, FeatureName, Track};

/// Mean absolute difference over the descriptors present on both sides.
///
/// Returns `(mean, shared_count)`, or `None` when the pair is not comparable:
/// different numbers of usable descriptors, or no descriptor in common.
pub fn mean_feature_difference(a: &AudioFeatures, b: &AudioFeatures) -> Option<(f64, usize)> {
    let count_a = a.present_count();
    if count_a == 0 || count_a != b.present_count() {
        return None;
    }

    let diffs: Vec<f64> = FeatureName::ALL
        .into_iter()
        .filter_map(|name| Some((a.get(name)? - b.get(name)?).abs()))
        .collect();
    if diffs.is_empty() {
        return None;
    }
    Some((diffs.iter().sum::<f64>() / diffs.len() as f64, diffs.len()))
}

/// Every unordered pair whose mean descriptor difference is strictly below
/// `threshold`. Tracks without usable descriptors never pair.
pub fn find_audio_duplicates(tracks: &[Track], threshold: f64) -> Result<Vec<AudioDuplicatePair<'_>>> {
    check_audio_threshold(threshold)?;

    // Skip featureless tracks up front; they cannot pair with anything
    let candidates: Vec<&Track> = tracks
        .iter()
        .filter(|t| !t.audio_features.is_empty())
        .collect();
    let n = candidates.len();

    let pairs: Vec<AudioDuplicatePair<'_>> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let candidates = &candidates;
            (i + 1..n).filter_map(move |j| {
                let first = candidates[i];
                let second = candidates[j];
                let (mean_difference, shared_features) =
                    mean_feature_difference(&first.audio_features, &second.audio_features)?;
                (mean_difference < threshold).then_some(AudioDuplicatePair {
                    first,
                    second,
                    mean_difference,
                    shared_features,
                })
            })
        })
        .collect();

    if n < tracks.len() {
        tracing::debug!(
            "audio duplicates: {} of {} tracks have no descriptors",
            tracks.len() - n,
            tracks.len()
        );
    }
    tracing::debug!("audio duplicates: {} pairs below {}", pairs.len(), threshold);
    Ok(pairs)
}
