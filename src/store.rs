//! SQLite persistence for artists, releases and tracks.
//!
//! Rows are decoded into typed records here. A release and its tracks are
//! written in one transaction; `(artist_id, link)` is unique.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rustc_hash::FxHashSet;
use std::path::Path;

use crate::error::StoreError;
use crate::models::{ArtistRecord, ReleaseDenorm, ReleaseSummary, Track, TrackRecord};

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS artists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nickname TEXT NOT NULL UNIQUE,
        last_checked TIMESTAMP
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_artists_nickname ON artists(nickname);

    CREATE TABLE IF NOT EXISTS releases (
        id INTEGER PRIMARY KEY,
        artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        release_date TIMESTAMP,
        link TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_releases_artist_link ON releases(artist_id, link);
    CREATE INDEX IF NOT EXISTS idx_releases_date ON releases(release_date);

    CREATE TABLE IF NOT EXISTS tracks (
        id INTEGER PRIMARY KEY,
        release_id INTEGER NOT NULL REFERENCES releases(id) ON DELETE CASCADE,
        number INTEGER NOT NULL,
        title TEXT NOT NULL,
        duration TEXT NOT NULL DEFAULT '',
        link TEXT NOT NULL DEFAULT ''
    );

    CREATE INDEX IF NOT EXISTS idx_tracks_release ON tracks(release_id, number);
";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        Self::configure(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Create the three tables and their indexes if absent. Idempotent.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Artists
    // ------------------------------------------------------------------------

    /// Look the nickname up, registering it (stamped with the current time)
    /// when unknown.
    pub fn get_or_create_artist(&self, nickname: &str) -> Result<i64> {
        let nickname = canonical_nickname(nickname);
        if let Some(id) = self.artist_id(&nickname)? {
            return Ok(id);
        }

        self.conn.execute(
            "INSERT INTO artists (nickname, last_checked) VALUES (?1, ?2)",
            params![nickname, Utc::now()],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(%nickname, id, "registered new artist");
        Ok(id)
    }

    /// Register an artist without touching `last_checked`. Returns the
    /// existing row when the nickname is already known.
    pub fn add_artist(&self, nickname: &str) -> Result<ArtistRecord> {
        let nickname = canonical_nickname(nickname);
        let id = match self.artist_id(&nickname)? {
            Some(id) => id,
            None => {
                self.conn
                    .execute("INSERT INTO artists (nickname) VALUES (?1)", [&nickname])?;
                self.conn.last_insert_rowid()
            }
        };
        self.get_artist(id)?.ok_or(StoreError::ArtistNotFound(id))
    }

    pub fn artist_id(&self, nickname: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM artists WHERE nickname = ?1",
                [canonical_nickname(nickname)],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn get_artist(&self, id: i64) -> Result<Option<ArtistRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, nickname, last_checked FROM artists WHERE id = ?1",
                [id],
                artist_from_row,
            )
            .optional()?)
    }

    pub fn list_artists(&self) -> Result<Vec<ArtistRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, nickname, last_checked FROM artists ORDER BY id")?;
        let artists = stmt
            .query_map([], artist_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artists)
    }

    pub fn list_artist_nicknames(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT nickname FROM artists ORDER BY id")?;
        let nicknames = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(nicknames)
    }

    /// Remove an artist with all of its releases and tracks.
    /// Returns false when no such artist exists.
    pub fn delete_artist(&self, id: i64) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM artists WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    // ------------------------------------------------------------------------
    // Releases
    // ------------------------------------------------------------------------

    pub fn known_links(&self, artist_id: i64) -> Result<FxHashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT link FROM releases WHERE artist_id = ?1")?;
        let links = stmt
            .query_map([artist_id], |row| row.get(0))?
            .collect::<rusqlite::Result<FxHashSet<String>>>()?;
        Ok(links)
    }

    pub fn release_id(&self, artist_id: i64, link: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM releases WHERE artist_id = ?1 AND link = ?2",
                params![artist_id, link],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn release_count(&self, artist_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM releases WHERE artist_id = ?1",
            [artist_id],
            |row| row.get(0),
        )?)
    }

    /// Insert a release row. A link already recorded for the artist is left
    /// untouched and `None` is returned.
    pub fn insert_release(
        &self,
        artist_id: i64,
        title: &str,
        release_date: Option<NaiveDate>,
        link: &str,
    ) -> Result<Option<i64>> {
        insert_release(&self.conn, artist_id, title, release_date, link)
    }

    pub fn insert_tracks(&self, release_id: i64, tracks: &[Track]) -> Result<()> {
        insert_tracks(&self.conn, release_id, tracks)
    }

    /// Write a release and all of its tracks atomically.
    pub fn persist_release(&mut self, artist_id: i64, release: &ReleaseDenorm) -> Result<Option<i64>> {
        let tx = self.conn.transaction()?;

        let Some(release_id) = insert_release(
            &tx,
            artist_id,
            &release.title,
            release.release_date,
            &release.link,
        )?
        else {
            return Ok(None);
        };

        if release.tracks.is_empty() {
            tracing::warn!(link = %release.link, "release stored without tracks");
        }
        insert_tracks(&tx, release_id, &release.tracks)?;

        tx.commit()?;
        Ok(Some(release_id))
    }

    pub fn tracks_for_release(&self, release_id: i64) -> Result<Vec<TrackRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, release_id, number, title, duration, link
             FROM tracks WHERE release_id = ?1 ORDER BY number",
        )?;
        let tracks = stmt
            .query_map([release_id], |row| {
                Ok(TrackRecord {
                    id: row.get(0)?,
                    release_id: row.get(1)?,
                    number: row.get(2)?,
                    title: row.get(3)?,
                    duration: row.get(4)?,
                    link: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    /// Releases dated on or after `date`, newest first, across all artists.
    /// Releases without a date never match.
    pub fn releases_since(&self, date: NaiveDate) -> Result<Vec<ReleaseSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.title, a.nickname, r.link, r.release_date
             FROM releases r INNER JOIN artists a ON r.artist_id = a.id
             WHERE r.release_date >= ?1
             ORDER BY r.release_date DESC, r.id DESC",
        )?;
        let rows = stmt
            .query_map([date], |row| {
                Ok(ReleaseSummary {
                    title: row.get(0)?,
                    artist: row.get(1)?,
                    link: row.get(2)?,
                    release_date: date_column(row, 3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Subdomains are case-insensitive, so nicknames are stored lowercased.
pub fn canonical_nickname(nickname: &str) -> String {
    nickname.trim().to_ascii_lowercase()
}

fn insert_release(
    conn: &Connection,
    artist_id: i64,
    title: &str,
    release_date: Option<NaiveDate>,
    link: &str,
) -> Result<Option<i64>> {
    let inserted = conn.execute(
        "INSERT INTO releases (artist_id, title, release_date, link) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(artist_id, link) DO NOTHING",
        params![artist_id, title, release_date, link],
    )?;

    if inserted == 0 {
        tracing::warn!(artist_id, link, "release link already stored, insert ignored");
        return Ok(None);
    }
    Ok(Some(conn.last_insert_rowid()))
}

fn insert_tracks(conn: &Connection, release_id: i64, tracks: &[Track]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO tracks (release_id, number, title, duration, link) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for track in tracks {
        stmt.execute(params![
            release_id,
            track.number,
            track.title,
            track.duration,
            track.link,
        ])?;
    }
    Ok(())
}

fn artist_from_row(row: &Row) -> rusqlite::Result<ArtistRecord> {
    Ok(ArtistRecord {
        id: row.get(0)?,
        nickname: row.get(1)?,
        last_checked: row.get(2)?,
    })
}

/// Dates are written as `YYYY-MM-DD`; older databases hold full timestamps
/// (`YYYY-MM-DD HH:MM:SS`), so only the date prefix is read.
fn date_column(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw
        .as_deref()
        .and_then(|s| s.get(..10))
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
}
