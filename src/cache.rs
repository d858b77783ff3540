//! Local cache of track collections per source, gated by a TTL.
//!
//! ## Schema
//!
//! ```sql
//! tracks(id PK, name, album, release_date, duration_ms, external_url,
//!        danceability, energy, valence, acousticness, instrumentalness,
//!        liveness, speechiness)
//! artists(id PK, name)
//! track_artists(track_id, artist_id, position, PK(track_id, artist_id))
//! source_tracks(source_id, track_id, added_at, PK(source_id, track_id))
//! cache_log(source_id PK, last_fetched)
//! ```
//!
//! Tracks and artists are shared across sources; a source only owns its
//! membership rows and its fetch-log entry.
//!
//! ## Key Invariants
//!
//! 1. `save` is one IMMEDIATE transaction: readers see the previous
//!    collection or the new one, never a mix.
//! 2. Validity is recomputed from `last_fetched` on every check.
//! 3. `load` returns exactly the last saved membership of a source, in save
//!    order, with artists in credited order.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::config::check_expiration_hours;
use crate::error::{DedupError, Result};
use crate::models::{AudioFeatures, Track};

const BUSY_TIMEOUT_SECS: u64 = 5;

/// Storage seam between the analysis core and whatever persists collections.
pub trait TrackCache {
    /// True iff `source_id` was saved less than `ttl_hours` ago.
    fn is_valid(&self, source_id: &str, ttl_hours: u32) -> Result<bool>;

    /// Every track attached to `source_id`; empty if the source is unknown.
    fn load(&self, source_id: &str) -> Result<Vec<Track>>;

    /// Replace the source's collection and stamp its fetch time, atomically.
    fn save(&self, source_id: &str, tracks: &[Track]) -> Result<()>;
}

// ============================================================================
// SQLite backend
// ============================================================================

pub struct SqliteTrackCache {
    conn: Mutex<Connection>,
}

impl SqliteTrackCache {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(BUSY_TIMEOUT_SECS))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS tracks (
                id               TEXT PRIMARY KEY,
                name             TEXT NOT NULL,
                album            TEXT,
                release_date     TEXT,
                duration_ms      INTEGER NOT NULL,
                external_url     TEXT,
                danceability     REAL,
                energy           REAL,
                valence          REAL,
                acousticness     REAL,
                instrumentalness REAL,
                liveness         REAL,
                speechiness      REAL
            );

            CREATE TABLE IF NOT EXISTS artists (
                id   TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS track_artists (
                track_id  TEXT NOT NULL REFERENCES tracks (id),
                artist_id TEXT NOT NULL REFERENCES artists (id),
                position  INTEGER NOT NULL,
                PRIMARY KEY (track_id, artist_id)
            );

            CREATE TABLE IF NOT EXISTS source_tracks (
                source_id TEXT NOT NULL,
                track_id  TEXT NOT NULL REFERENCES tracks (id),
                added_at  TEXT NOT NULL,
                PRIMARY KEY (source_id, track_id)
            );

            CREATE TABLE IF NOT EXISTS cache_log (
                source_id    TEXT PRIMARY KEY,
                last_fetched TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DedupError::CacheUnavailable("cache connection lock poisoned".to_string()))
    }

    /// When `source_id` was last saved, if ever.
    pub fn last_fetched(&self, source_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let last = conn
            .query_row(
                "SELECT last_fetched FROM cache_log WHERE source_id = ?1",
                [source_id],
                |row| row.get::<_, DateTime<Utc>>(0),
            )
            .optional()?;
        Ok(last)
    }

    /// `is_valid` against an explicit clock.
    pub fn is_valid_at(&self, source_id: &str, ttl_hours: u32, now: DateTime<Utc>) -> Result<bool> {
        check_expiration_hours(ttl_hours)?;
        let valid = match self.last_fetched(source_id)? {
            Some(last) => now - last < Duration::hours(i64::from(ttl_hours)),
            None => false,
        };
        Ok(valid)
    }

    /// `save` stamped with an explicit clock.
    pub fn save_at(&self, source_id: &str, tracks: &[Track], now: DateTime<Utc>) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut upsert_track = tx.prepare_cached(
                "INSERT INTO tracks (id, name, album, release_date, duration_ms, external_url,
                                     danceability, energy, valence, acousticness,
                                     instrumentalness, liveness, speechiness)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT (id) DO UPDATE SET
                     name = excluded.name,
                     album = excluded.album,
                     release_date = excluded.release_date,
                     duration_ms = excluded.duration_ms,
                     external_url = excluded.external_url,
                     danceability = excluded.danceability,
                     energy = excluded.energy,
                     valence = excluded.valence,
                     acousticness = excluded.acousticness,
                     instrumentalness = excluded.instrumentalness,
                     liveness = excluded.liveness,
                     speechiness = excluded.speechiness",
            )?;
            let mut upsert_artist = tx.prepare_cached(
                "INSERT INTO artists (id, name) VALUES (?1, ?2)
                 ON CONFLICT (id) DO UPDATE SET name = excluded.name",
            )?;
            let mut clear_links = tx.prepare_cached("DELETE FROM track_artists WHERE track_id = ?1")?;
            let mut link = tx.prepare_cached(
                "INSERT OR IGNORE INTO track_artists (track_id, artist_id, position) VALUES (?1, ?2, ?3)",
            )?;
            let mut attach = tx.prepare_cached(
                "INSERT OR REPLACE INTO source_tracks (source_id, track_id, added_at) VALUES (?1, ?2, ?3)",
            )?;

            tx.execute("DELETE FROM source_tracks WHERE source_id = ?1", [source_id])?;

            for track in tracks {
                let duration_ms = i64::try_from(track.duration_ms).map_err(|_| {
                    DedupError::CacheUnavailable(format!(
                        "track {} duration {} ms exceeds the storable range",
                        track.id, track.duration_ms
                    ))
                })?;
                let f = &track.audio_features;
                upsert_track.execute(params![
                    track.id,
                    track.title(),
                    track.album,
                    track.release_date,
                    duration_ms,
                    track.external_url,
                    f.danceability,
                    f.energy,
                    f.valence,
                    f.acousticness,
                    f.instrumentalness,
                    f.liveness,
                    f.speechiness,
                ])?;

                clear_links.execute([&track.id])?;
                for (position, (artist_id, name)) in
                    track.artist_ids.iter().zip(&track.artists).enumerate()
                {
                    upsert_artist.execute(params![artist_id, name])?;
                    link.execute(params![track.id, artist_id, position as i64])?;
                }

                attach.execute(params![source_id, track.id, track.added_at])?;
            }
        }
        tx.execute(
            "INSERT INTO cache_log (source_id, last_fetched) VALUES (?1, ?2)
             ON CONFLICT (source_id) DO UPDATE SET last_fetched = excluded.last_fetched",
            params![source_id, now],
        )?;
        tx.commit()?;

        tracing::info!("cached {} tracks for source {}", tracks.len(), source_id);
        Ok(())
    }
}

impl TrackCache for SqliteTrackCache {
    fn is_valid(&self, source_id: &str, ttl_hours: u32) -> Result<bool> {
        self.is_valid_at(source_id, ttl_hours, Utc::now())
    }

    fn load(&self, source_id: &str) -> Result<Vec<Track>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT t.id, t.name, t.album, t.release_date, t.duration_ms, t.external_url,
                    t.danceability, t.energy, t.valence, t.acousticness,
                    t.instrumentalness, t.liveness, t.speechiness,
                    st.added_at, a.id, a.name
             FROM source_tracks st
             JOIN tracks t ON t.id = st.track_id
             LEFT JOIN track_artists ta ON ta.track_id = t.id
             LEFT JOIN artists a ON a.id = ta.artist_id
             WHERE st.source_id = ?1
             ORDER BY st.rowid, ta.position",
        )?;

        let mut rows = stmt.query([source_id])?;
        let mut tracks: Vec<Track> = Vec::new();

        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            // One row per credited artist; consecutive rows share a track
            let is_new = tracks.last().map_or(true, |t| t.id != id);
            if is_new {
                let stored: i64 = row.get(4)?;
                let duration_ms =
                    u64::try_from(stored).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(4, stored))?;
                let mut track = Track::new(id, row.get::<_, String>(1)?)
                    .with_duration_ms(duration_ms)
                    .with_added_at(row.get::<_, String>(13)?)
                    .with_features(AudioFeatures {
                        danceability: row.get(6)?,
                        energy: row.get(7)?,
                        valence: row.get(8)?,
                        acousticness: row.get(9)?,
                        instrumentalness: row.get(10)?,
                        liveness: row.get(11)?,
                        speechiness: row.get(12)?,
                    });
                track.album = row.get(2)?;
                track.release_date = row.get(3)?;
                track.external_url = row.get(5)?;
                tracks.push(track);
            }

            let artist_id: Option<String> = row.get(14)?;
            let artist_name: Option<String> = row.get(15)?;
            if let (Some(artist_id), Some(name), Some(track)) = (artist_id, artist_name, tracks.last_mut()) {
                track.artist_ids.push(artist_id);
                track.artists.push(name);
            }
        }

        tracing::debug!("loaded {} cached tracks for source {}", tracks.len(), source_id);
        Ok(tracks)
    }

    fn save(&self, source_id: &str, tracks: &[Track]) -> Result<()> {
        self.save_at(source_id, tracks, Utc::now())
    }
}

// ============================================================================
// Cache-or-fetch
// ============================================================================

/// Where a collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOrigin {
    Cache,
    Fresh,
}

/// Serve `source_id` from the cache when it is still valid, otherwise call
/// `fetch` and persist its result.
///
/// Cache failures are logged and treated as a miss (or a skipped save);
/// only an invalid TTL and errors from `fetch` reach the caller.
pub fn cached_or_fetch<C, F, E>(
    cache: &C,
    source_id: &str,
    ttl_hours: u32,
    fetch: F,
) -> std::result::Result<(Vec<Track>, CollectionOrigin), E>
where
    C: TrackCache + ?Sized,
    F: FnOnce() -> std::result::Result<Vec<Track>, E>,
    E: From<DedupError>,
{
    check_expiration_hours(ttl_hours)?;

    match cache.is_valid(source_id, ttl_hours) {
        Ok(true) => match cache.load(source_id) {
            Ok(tracks) => {
                tracing::info!("cache hit for {} ({} tracks)", source_id, tracks.len());
                return Ok((tracks, CollectionOrigin::Cache));
            }
            Err(err) => tracing::warn!("cache load failed for {}, refetching: {}", source_id, err),
        },
        Ok(false) => tracing::info!("cache miss or stale entry for {}", source_id),
        Err(err) => tracing::warn!("cache check failed for {}, treating as stale: {}", source_id, err),
    }

    let tracks = fetch()?;
    if let Err(err) = cache.save(source_id, &tracks) {
        tracing::warn!("could not cache {}: {}", source_id, err);
    }
    Ok((tracks, CollectionOrigin::Fresh))
}
