//! Storage layer for trackfeed.
//!
//! This module provides `SQLite`-based persistence for tracks and webhook
//! subscriptions. It is a plain persistence collaborator: it executes
//! statements and reports failures, while the policies (deduplication, id
//! allocation, serialisation of writers) live in [`crate::db`].

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::track::{NewTrack, TrackId, TrackRecord};
use crate::webhook::{WebhookId, WebhookSubscription};

/// Metadata key holding the highest track id ever assigned.
const LAST_TRACK_ID_KEY: &str = "last_track_id";

/// Metadata key holding the highest webhook id ever assigned.
const LAST_WEBHOOK_ID_KEY: &str = "last_webhook_id";

const TRACK_COLUMNS: &str = "id, source_key, source_url, pilot, glider, glider_id, \
                             distance, flight_date, arrival_timestamp";

/// Storage engine for tracks and webhooks.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL keeps readers from blocking on the writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    // === Tracks ===

    /// Insert a track under the given id and arrival timestamp.
    ///
    /// The row and the id high-water mark are written in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails, including a unique
    /// constraint violation on `source_key`.
    pub fn insert_track(&mut self, id: TrackId, track: &NewTrack, arrival: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r"
            INSERT INTO tracks (id, source_key, source_url, pilot, glider, glider_id,
                                distance, flight_date, arrival_timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                id,
                track.source_key,
                track.source_url,
                track.parsed.pilot,
                track.parsed.glider,
                track.parsed.glider_id,
                track.parsed.distance,
                track.parsed.date.map(|d| d.to_string()),
                arrival,
            ],
        )?;
        write_counter(&tx, LAST_TRACK_ID_KEY, id)?;
        tx.commit()?;

        debug!("Inserted track with id {}", id);
        Ok(())
    }

    /// Find the id of the track stored under a dedup key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_track_id_by_source_key(&self, source_key: &str) -> Result<Option<TrackId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM tracks WHERE source_key = ?1",
                [source_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Get a track by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_track(&self, id: TrackId) -> Result<Option<TrackRecord>> {
        let track = self
            .conn
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?1"),
                [id],
                Self::row_to_track,
            )
            .optional()?;
        Ok(track)
    }

    /// Get all tracks in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn all_tracks(&self) -> Result<Vec<TrackRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TRACK_COLUMNS} FROM tracks ORDER BY id ASC"))?;

        let tracks = stmt
            .query_map([], Self::row_to_track)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tracks)
    }

    /// Get all track ids in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn track_ids(&self) -> Result<Vec<TrackId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM tracks ORDER BY id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Get the ids of the `limit` most recent tracks, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_track_ids(&self, limit: u64) -> Result<Vec<TrackId>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM tracks ORDER BY id DESC LIMIT ?1")?;
        let mut ids = stmt
            .query_map([limit_i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<TrackId>, _>>()?;
        ids.reverse();
        Ok(ids)
    }

    /// Count total tracks in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_tracks(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Delete every track. Returns the number of tracks removed.
    ///
    /// The id high-water mark in the metadata table is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_all_tracks(&mut self) -> Result<u64> {
        let affected = self.conn.execute("DELETE FROM tracks", [])?;
        if affected > 0 {
            info!("Deleted {} tracks", affected);
        }
        Ok(affected as u64)
    }

    /// The highest track id ever assigned, or 0 for a fresh database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn last_track_id(&self) -> Result<TrackId> {
        let stored: TrackId =
            self.conn
                .query_row("SELECT COALESCE(MAX(id), 0) FROM tracks", [], |row| {
                    row.get(0)
                })?;
        Ok(stored.max(self.read_counter(LAST_TRACK_ID_KEY)?))
    }

    /// The arrival timestamp of the newest stored track.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_arrival(&self) -> Result<Option<i64>> {
        let latest: Option<i64> =
            self.conn
                .query_row("SELECT MAX(arrival_timestamp) FROM tracks", [], |row| {
                    row.get(0)
                })?;
        Ok(latest)
    }

    // === Webhooks ===

    /// Insert a webhook subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_webhook(&mut self, webhook: &WebhookSubscription) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO webhooks (id, url, min_trigger_count) VALUES (?1, ?2, ?3)",
            params![webhook.id, webhook.url, webhook.min_trigger_count],
        )?;
        write_counter(&tx, LAST_WEBHOOK_ID_KEY, webhook.id)?;
        tx.commit()?;

        debug!("Inserted webhook with id {}", webhook.id);
        Ok(())
    }

    /// Get a webhook subscription by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_webhook(&self, id: WebhookId) -> Result<Option<WebhookSubscription>> {
        let webhook = self
            .conn
            .query_row(
                "SELECT id, url, min_trigger_count FROM webhooks WHERE id = ?1",
                [id],
                Self::row_to_webhook,
            )
            .optional()?;
        Ok(webhook)
    }

    /// Get all webhook subscriptions in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn all_webhooks(&self) -> Result<Vec<WebhookSubscription>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, url, min_trigger_count FROM webhooks ORDER BY id ASC")?;
        let webhooks = stmt
            .query_map([], Self::row_to_webhook)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(webhooks)
    }

    /// Delete a webhook subscription, returning the removed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_webhook(&mut self, id: WebhookId) -> Result<Option<WebhookSubscription>> {
        let tx = self.conn.transaction()?;
        let webhook = tx
            .query_row(
                "SELECT id, url, min_trigger_count FROM webhooks WHERE id = ?1",
                [id],
                Self::row_to_webhook,
            )
            .optional()?;
        if webhook.is_some() {
            tx.execute("DELETE FROM webhooks WHERE id = ?1", [id])?;
        }
        tx.commit()?;
        Ok(webhook)
    }

    /// Count registered webhooks.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_webhooks(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM webhooks", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// The highest webhook id ever assigned, or 0 for a fresh database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn last_webhook_id(&self) -> Result<WebhookId> {
        let stored: WebhookId =
            self.conn
                .query_row("SELECT COALESCE(MAX(id), 0) FROM webhooks", [], |row| {
                    row.get(0)
                })?;
        Ok(stored.max(self.read_counter(LAST_WEBHOOK_ID_KEY)?))
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let newest_arrival = self
            .latest_arrival()?
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_tracks: self.count_tracks()?,
            total_webhooks: self.count_webhooks()?,
            last_track_id: self.last_track_id()?,
            last_webhook_id: self.last_webhook_id()?,
            newest_arrival,
            db_size_bytes,
        })
    }

    fn read_counter(&self, key: &str) -> Result<i64> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        match value {
            None => Ok(0),
            Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
                message: format!("invalid value for {key}: {value}"),
            }),
        }
    }

    /// Convert a database row to a `TrackRecord`.
    fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<TrackRecord> {
        let flight_date: Option<String> = row.get(7)?;
        let date = flight_date.and_then(|s| match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                warn!("Ignoring malformed flight date: {}", s);
                None
            }
        });

        Ok(TrackRecord {
            id: row.get(0)?,
            source_key: row.get(1)?,
            source_url: row.get(2)?,
            pilot: row.get(3)?,
            glider: row.get(4)?,
            glider_id: row.get(5)?,
            distance: row.get(6)?,
            date,
            arrival_timestamp: row.get(8)?,
        })
    }

    /// Convert a database row to a `WebhookSubscription`.
    fn row_to_webhook(row: &rusqlite::Row) -> rusqlite::Result<WebhookSubscription> {
        let min_trigger_count: i64 = row.get(2)?;
        Ok(WebhookSubscription {
            id: row.get(0)?,
            url: row.get(1)?,
            min_trigger_count: u32::try_from(min_trigger_count).unwrap_or(1).max(1),
        })
    }
}

fn write_counter(conn: &Connection, key: &str, value: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (key, value.to_string()),
    )?;
    Ok(())
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of tracks stored.
    pub total_tracks: u64,
    /// Total number of webhook subscriptions.
    pub total_webhooks: u64,
    /// Highest track id ever assigned.
    pub last_track_id: TrackId,
    /// Highest webhook id ever assigned.
    pub last_webhook_id: WebhookId,
    /// Arrival time of the newest track.
    pub newest_arrival: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
