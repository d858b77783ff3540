use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_dedup::cache::{cached_or_fetch, CollectionOrigin, SqliteTrackCache, TrackCache};
use library_dedup::config::AnalysisConfig;
use library_dedup::ingest::{merge_audio_features, normalize_records, RawAudioFeatures};
use library_dedup::models::{playlist_source_id, Track, LIKED_SONGS_SOURCE};
use library_dedup::progress::{create_spinner, finish_spinner, format_duration, set_log_only};
use library_dedup::report::{analyze, AnalysisReport};

#[derive(Parser)]
#[command(name = "library-dedup")]
#[command(about = "Find duplicate and near-duplicate tracks in a music library")]
struct Args {
    /// SQLite cache database
    #[arg(long, default_value = "library_cache.sqlite3")]
    db: PathBuf,

    /// Analyze a playlist (share URL or id) instead of liked songs
    #[arg(long)]
    playlist: Option<String>,

    /// Saved-item records (JSON array or `{"items": [...]}` page)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Audio-feature records (JSON array or `{"audio_features": [...]}`)
    #[arg(long)]
    features: Option<PathBuf>,

    /// Artist id → genres map (JSON object)
    #[arg(long)]
    genres: Option<PathBuf>,

    #[arg(long, default_value = "library-dedup.toml")]
    config: PathBuf,

    /// Similarity threshold in percent (overrides config)
    #[arg(long)]
    threshold: Option<u32>,

    /// Cache validity window in hours (overrides config)
    #[arg(long)]
    expiration_hours: Option<u32>,

    /// Mean descriptor difference for audio duplicates (overrides config)
    #[arg(long)]
    audio_threshold: Option<f64>,

    /// Ignore a valid cache entry and re-ingest --input
    #[arg(long)]
    refresh: bool,

    /// Write the full report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Rows printed per section of the summary
    #[arg(long, default_value = "10")]
    limit: usize,

    #[arg(long, default_value = "0")]
    workers: usize,

    /// Hide spinners; phase results go to the log
    #[arg(long)]
    log_only: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SavedItems {
    List(Vec<serde_json::Value>),
    Page { items: Vec<serde_json::Value> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureRecords {
    List(Vec<Option<RawAudioFeatures>>),
    Page { audio_features: Vec<Option<RawAudioFeatures>> },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_dedup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn resolve_config(args: &Args) -> Result<AnalysisConfig> {
    let mut config = AnalysisConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {:?}", args.config))?;
    if let Some(threshold) = args.threshold {
        config.similarity_threshold = threshold;
    }
    if let Some(hours) = args.expiration_hours {
        config.cache_expiration_hours = hours;
    }
    if let Some(audio) = args.audio_threshold {
        config.audio_threshold = audio;
    }
    config.validate()?;
    Ok(config)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))
}

/// Build the collection from the input files.
fn ingest(args: &Args, source_id: &str) -> Result<Vec<Track>> {
    let Some(input) = &args.input else {
        bail!("No valid cache entry for {} and no --input given", source_id);
    };

    let items = match read_json::<SavedItems>(input)? {
        SavedItems::List(items) | SavedItems::Page { items } => items,
    };
    let outcome = normalize_records(items);
    println!(
        "Ingested {} tracks from {:?} ({} malformed records dropped)",
        outcome.tracks.len(),
        input,
        outcome.dropped
    );

    let mut tracks = outcome.tracks;
    if let Some(path) = &args.features {
        let records = match read_json::<FeatureRecords>(path)? {
            FeatureRecords::List(audio_features) | FeatureRecords::Page { audio_features } => audio_features,
        };
        let enriched = merge_audio_features(&mut tracks, records);
        println!("Audio features for {}/{} tracks", enriched, tracks.len());
    }
    Ok(tracks)
}

fn open_cache(path: &Path) -> Option<SqliteTrackCache> {
    match SqliteTrackCache::open(path) {
        Ok(cache) => Some(cache),
        Err(err) => {
            tracing::warn!("cache {:?} unavailable, continuing without it: {}", path, err);
            None
        }
    }
}

fn load_collection(args: &Args, config: &AnalysisConfig, source_id: &str) -> Result<Vec<Track>> {
    let started = Instant::now();
    let pb = create_spinner(&format!("Loading {}", source_id));
    let cache = open_cache(&args.db);

    let (tracks, origin) = match &cache {
        Some(cache) if !args.refresh => {
            cached_or_fetch(cache, source_id, config.cache_expiration_hours, || ingest(args, source_id))?
        }
        Some(cache) => {
            let tracks = ingest(args, source_id)?;
            if let Err(err) = cache.save(source_id, &tracks) {
                tracing::warn!("could not cache {}: {}", source_id, err);
            }
            (tracks, CollectionOrigin::Fresh)
        }
        None => (ingest(args, source_id)?, CollectionOrigin::Fresh),
    };

    let from = match origin {
        CollectionOrigin::Cache => "cache",
        CollectionOrigin::Fresh => "input",
    };
    finish_spinner(&pb, &format!("Loaded {} tracks from {}", tracks.len(), from), started);
    Ok(tracks)
}

// ============================================================================
// Summary
// ============================================================================

fn print_summary(report: &AnalysisReport<'_>, limit: usize) {
    let stats = &report.statistics;

    println!("\n{:=<60}", "");
    println!(
        "Library: {} tracks, {} artists, {:.1} hours",
        stats.track_count, stats.unique_artists, stats.total_duration_hours
    );
    println!("{:=<60}", "");

    println!("\nExact duplicates: {}", report.exact_duplicates.len());
    for track in report.exact_duplicates.iter().take(limit) {
        println!("  {} - {} [{}]", track.artist_display(), track.title(), track.id);
    }

    println!("\nRepeated entries: {}", report.versions.len());
    for track in report.versions.iter().take(limit) {
        println!("  {} - {} (added {})", track.artist_display(), track.title(), track.added_at);
    }

    println!("\nSimilar titles (>= {}%): {}", report.config.similarity_threshold, report.similar_pairs.len());
    for pair in report.similar_pairs.iter().take(limit) {
        println!("  {:>3}%  {}  <->  {}", pair.score, pair.first.title(), pair.second.title());
    }

    println!("\nTitle clusters: {}", report.clusters.len());
    for (label, members) in report.clusters.iter().take(limit) {
        let titles: Vec<&str> = members.iter().map(|t| t.title()).collect();
        println!("  #{}: {}", label, titles.join(" | "));
    }

    println!("\nAudio duplicates (< {}): {}", report.config.audio_threshold, report.audio_duplicates.len());
    for pair in report.audio_duplicates.iter().take(limit) {
        println!(
            "  {:.3} over {} features  {}  <->  {}",
            pair.mean_difference, pair.shared_features, pair.first.title(), pair.second.title()
        );
    }

    println!("\nTop artists:");
    for (artist, count) in &stats.top_artists {
        println!("  {:>5}  {}", count, artist);
    }
    println!("\nTop release years:");
    for (year, count) in &stats.top_years {
        println!("  {:>5}  {}", count, year);
    }

    if let Some(profile) = &report.taste_profile {
        println!("\nTaste profile:");
        for (name, mean) in profile {
            println!("  {:<17} {:.3}", name.as_str(), mean);
        }
    }

    if !report.genres.is_empty() {
        println!("\nTop genres:");
        for (genre, count) in &report.genres {
            println!("  {:>5}  {}", count, genre);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let start = Instant::now();
    let config = resolve_config(&args)?;

    let source_id = match &args.playlist {
        Some(playlist) => playlist_source_id(playlist)
            .with_context(|| format!("No playlist id found in {:?}", playlist))?,
        None => LIKED_SONGS_SOURCE.to_string(),
    };

    let tracks = load_collection(&args, &config, &source_id)?;

    let artist_genres: HashMap<String, Vec<String>> = match &args.genres {
        Some(path) => read_json(path)?,
        None => HashMap::new(),
    };

    let started = Instant::now();
    let pb = create_spinner("Analyzing");
    let report = analyze(&tracks, &config, &artist_genres)?;
    finish_spinner(&pb, "Analysis complete", started);

    print_summary(&report, args.limit);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))?;
        println!("\nReport written to {:?}", path);
    }

    println!("\nElapsed: {}", format_duration(start.elapsed()));
    if report.is_clean() {
        println!("No duplicates found.");
    }
    Ok(())
}
