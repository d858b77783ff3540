//! Duplicate detection and listening statistics for a personal music library,
//! with a TTL-gated SQLite cache of fetched track collections.

pub mod audio;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod report;
pub mod similarity;
pub mod stats;

pub use cache::{cached_or_fetch, CollectionOrigin, SqliteTrackCache, TrackCache};
pub use config::AnalysisConfig;
pub use error::{DedupError, Result};
pub use models::{AudioFeatures, FeatureName, Track, LIKED_SONGS_SOURCE};
pub use report::{analyze, AnalysisReport};
