//! Vector-space clustering of normalized titles.
//!
//! ## Pipeline
//!
//! 1. TF-IDF vector per normalized title (tokens of 2+ characters, smoothed
//!    idf `ln((1 + n) / (1 + df)) + 1`, rows L2-normalized)
//! 2. Cosine similarity between every pair of rows, as distance `1 - sim`
//! 3. Average-linkage agglomeration over the full distance matrix
//! 4. Flat cut: merges at distance `< 1 - threshold / 100` are kept
//!
//! The dendrogram is built with the nearest-neighbor-chain algorithm, which
//! is O(n²) time for average linkage. The distance matrix is O(n²) memory.
//! Only clusters with two or more members are returned.
//!
//! Note the threshold here is a cosine-similarity percentage, not the token
//! ratio used by `similarity::find_similar`. Same config value, different
//! similarity space.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::{check_percent, Result};
use crate::models::{ClusterMap, Track};

// ============================================================================
// TF-IDF
// ============================================================================

/// Sparse row: (term index, weight), sorted by term index.
type SparseRow = Vec<(usize, f64)>;

fn tokenize(title: &str) -> impl Iterator<Item = &str> {
    title.split_whitespace().filter(|t| t.chars().count() >= 2)
}

/// Build L2-normalized TF-IDF rows for a set of documents.
pub(crate) fn tfidf_rows(documents: &[&str]) -> Vec<SparseRow> {
    let mut vocabulary: FxHashMap<&str, usize> = FxHashMap::default();
    let mut document_frequency: Vec<usize> = Vec::new();
    let mut counts: Vec<FxHashMap<usize, usize>> = Vec::with_capacity(documents.len());

    for doc in documents {
        let mut tf: FxHashMap<usize, usize> = FxHashMap::default();
        for token in tokenize(doc) {
            let next = vocabulary.len();
            let term = *vocabulary.entry(token).or_insert(next);
            if term == document_frequency.len() {
                document_frequency.push(0);
            }
            *tf.entry(term).or_default() += 1;
        }
        for term in tf.keys() {
            document_frequency[*term] += 1;
        }
        counts.push(tf);
    }

    let n = documents.len() as f64;
    let idf: Vec<f64> = document_frequency
        .iter()
        .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
        .collect();

    counts
        .into_iter()
        .map(|tf| {
            let mut row: SparseRow = tf
                .into_iter()
                .map(|(term, count)| (term, count as f64 * idf[term]))
                .collect();
            row.sort_unstable_by_key(|(term, _)| *term);
            let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for (_, w) in row.iter_mut() {
                    *w /= norm;
                }
            }
            row
        })
        .collect()
}

/// Dot product of two normalized sparse rows. Empty rows have similarity 0.
pub(crate) fn cosine(a: &SparseRow, b: &SparseRow) -> f64 {
    let (mut i, mut j, mut dot) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

// ============================================================================
// Agglomeration
// ============================================================================

/// One dendrogram merge: slots `keep` and `absorbed` joined at `distance`.
/// Slot `keep` is the smaller index and always contains element `keep`.
#[derive(Debug, Clone, Copy)]
struct Merge {
    keep: usize,
    absorbed: usize,
    distance: f64,
}

/// Average-linkage dendrogram via nearest-neighbor chain.
/// `dist` is a full row-major n×n matrix and is consumed as scratch space.
fn average_linkage(mut dist: Vec<f64>, n: usize) -> Vec<Merge> {
    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));
    let mut chain: Vec<usize> = Vec::new();
    let mut remaining = n;

    while remaining > 1 {
        if chain.is_empty() {
            if let Some(first) = active.iter().position(|&a| a) {
                chain.push(first);
            }
        }

        loop {
            let a = chain[chain.len() - 1];
            let previous = (chain.len() >= 2).then(|| chain[chain.len() - 2]);

            // Prefer the previous chain element on ties so the chain terminates
            let mut best = previous;
            let mut best_distance = previous.map_or(f64::INFINITY, |p| dist[a * n + p]);
            for k in 0..n {
                if k != a && active[k] && dist[a * n + k] < best_distance {
                    best = Some(k);
                    best_distance = dist[a * n + k];
                }
            }
            let Some(b) = best else {
                return merges;
            };

            if Some(b) == previous {
                chain.truncate(chain.len() - 2);
                let (keep, absorbed) = if a < b { (a, b) } else { (b, a) };
                for k in 0..n {
                    if active[k] && k != keep && k != absorbed {
                        let merged = (size[keep] as f64 * dist[keep * n + k]
                            + size[absorbed] as f64 * dist[absorbed * n + k])
                            / (size[keep] + size[absorbed]) as f64;
                        dist[keep * n + k] = merged;
                        dist[k * n + keep] = merged;
                    }
                }
                size[keep] += size[absorbed];
                active[absorbed] = false;
                remaining -= 1;
                merges.push(Merge {
                    keep,
                    absorbed,
                    distance: best_distance,
                });
                break;
            }
            chain.push(b);
        }
    }
    merges
}

fn find_root(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Flat cluster id per element: apply every merge strictly below `cut`.
fn flat_assignment(merges: &[Merge], n: usize, cut: f64) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..n).collect();
    for merge in merges.iter().filter(|m| m.distance < cut) {
        let a = find_root(&mut parent, merge.keep);
        let b = find_root(&mut parent, merge.absorbed);
        if a != b {
            parent[b.max(a)] = a.min(b);
        }
    }
    (0..n).map(|i| find_root(&mut parent, i)).collect()
}

// ============================================================================
// Public API
// ============================================================================

/// Group tracks whose normalized titles are close in TF-IDF space.
///
/// `threshold` is a percentage (0-100); 85 cuts the dendrogram at cosine
/// distance 0.15. Labels are assigned 0, 1, 2... in order of each cluster's
/// first member in the collection.
pub fn cluster(tracks: &[Track], threshold: u32) -> Result<ClusterMap<'_>> {
    check_percent("similarity_threshold", threshold)?;

    let n = tracks.len();
    let mut clusters = ClusterMap::new();
    if n < 2 {
        return Ok(clusters);
    }

    let documents: Vec<&str> = tracks.iter().map(|t| t.normalized_title()).collect();
    let rows = tfidf_rows(&documents);

    let dist: Vec<f64> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let rows = &rows;
            (0..n).map(move |j| (1.0 - cosine(&rows[i], &rows[j])).max(0.0))
        })
        .collect();

    let merges = average_linkage(dist, n);
    let cut = 1.0 - threshold as f64 / 100.0;
    let roots = flat_assignment(&merges, n, cut);

    let mut members: FxHashMap<usize, usize> = FxHashMap::default();
    for root in &roots {
        *members.entry(*root).or_default() += 1;
    }

    let mut labels: FxHashMap<usize, usize> = FxHashMap::default();
    for (track, root) in tracks.iter().zip(&roots) {
        if members[root] < 2 {
            continue;
        }
        let next = labels.len();
        let label = *labels.entry(*root).or_insert(next);
        clusters.entry(label).or_default().push(track);
    }

    tracing::debug!(
        "clustering: {} clusters of 2+ among {} tracks (cut distance {:.2})",
        clusters.len(),
        n,
        cut
    );
    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(titles: &[&str]) -> Vec<Track> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| Track::new(format!("t{i}"), *t))
            .collect()
    }

    fn ids(clusters: &ClusterMap<'_>) -> Vec<Vec<String>> {
        clusters
            .values()
            .map(|members| members.iter().map(|t| t.id.clone()).collect())
            .collect()
    }

    #[test]
    fn test_tfidf_rows_are_normalized() {
        let rows = tfidf_rows(&["hey jude", "hey there", "a"]);
        for row in &rows[..2] {
            let norm: f64 = row.iter().map(|(_, w)| w * w).sum();
            assert!((norm - 1.0).abs() < 1e-9);
        }
        // single-character tokens are ignored
        assert!(rows[2].is_empty());
        assert!((cosine(&rows[0], &rows[0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine(&rows[0], &rows[2]), 0.0);
    }

    #[test]
    fn test_identical_titles_cluster() {
        let tracks = titled(&["Hey Jude", "Yesterday", "Hey Jude (Remastered)", "Let It Be"]);
        let clusters = cluster(&tracks, 85).unwrap();
        assert_eq!(ids(&clusters), vec![vec!["t0".to_string(), "t2".to_string()]]);
        assert!(clusters.contains_key(&0));
    }

    #[test]
    fn test_unrelated_titles_do_not_cluster() {
        let tracks = titled(&["Yesterday", "Bohemian Rhapsody", "Imagine"]);
        assert!(cluster(&tracks, 85).unwrap().is_empty());
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(cluster(&[], 85).unwrap().is_empty());
        assert!(cluster(&titled(&["Solo"]), 85).unwrap().is_empty());
    }

    #[test]
    fn test_threshold_100_never_merges() {
        let tracks = titled(&["Song", "Song"]);
        assert!(cluster(&tracks, 100).unwrap().is_empty());
        assert_eq!(cluster(&tracks, 99).unwrap().len(), 1);
    }

    #[test]
    fn test_average_linkage_chains_groups() {
        let tracks = titled(&[
            "love me do",
            "love me tender",
            "purple rain",
            "purple rain purple",
            "love me do",
        ]);
        let clusters = cluster(&tracks, 50).unwrap();
        let groups = ids(&clusters);
        assert!(groups.contains(&vec!["t2".to_string(), "t3".to_string()]));
        assert!(groups.iter().any(|g| g.contains(&"t0".to_string()) && g.contains(&"t4".to_string())));
    }

    #[test]
    fn test_threshold_monotonic_coverage() {
        let tracks = titled(&[
            "hey jude",
            "hey jude live",
            "hey there delilah",
            "hello goodbye",
            "hello hello",
            "goodbye yellow brick road",
            "yellow submarine",
            "yellow",
        ]);
        let mut previous_coverage = usize::MAX;
        for threshold in [0, 20, 40, 60, 80, 95, 100] {
            let coverage: usize = cluster(&tracks, threshold).unwrap().values().map(Vec::len).sum();
            assert!(coverage <= previous_coverage, "coverage grew at threshold {threshold}");
            previous_coverage = coverage;
        }
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        assert!(cluster(&titled(&["a", "b"]), 200).is_err());
    }
}
