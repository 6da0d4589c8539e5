//! `SQLite` schema definitions for trackfeed.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the tracks table.
///
/// Ids are assigned by the application, not by `SQLite`, so they are never
/// reused after a bulk delete.
pub const CREATE_TRACKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY,
    source_key TEXT NOT NULL,
    source_url TEXT NOT NULL,
    pilot TEXT NOT NULL,
    glider TEXT NOT NULL,
    glider_id TEXT NOT NULL,
    distance REAL NOT NULL,
    flight_date TEXT,
    arrival_timestamp INTEGER NOT NULL
)
";

/// SQL statement to create the unique index on `source_key` for deduplication.
pub const CREATE_SOURCE_KEY_INDEX: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_tracks_source_key ON tracks(source_key)
";

/// SQL statement to create an index on arrival time for ticker queries.
pub const CREATE_ARRIVAL_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_tracks_arrival ON tracks(arrival_timestamp)
";

/// SQL statement to create the webhooks table.
pub const CREATE_WEBHOOKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS webhooks (
    id INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    min_trigger_count INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_TRACKS_TABLE,
    CREATE_SOURCE_KEY_INDEX,
    CREATE_ARRIVAL_INDEX,
    CREATE_WEBHOOKS_TABLE,
    CREATE_METADATA_TABLE,
];
