//! Shared database handle and identifier allocation.
//!
//! [`Database`] is constructed once at startup and cloned into every
//! collaborator. It owns the storage connection together with the track and
//! webhook [`IdAllocator`]s behind one mutex, so that a dedup check, the id
//! allocation and the insert are a single step with respect to every other
//! caller. [`TrackStore`] and [`WebhookRegistry`] are typed views over it.

pub mod tracks;
pub mod webhooks;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{info, warn};

use crate::error::Result;
use crate::storage::{Storage, StorageStats};
use crate::track::TrackId;
use crate::webhook::WebhookSubscription;

pub use tracks::TrackStore;
pub use webhooks::WebhookRegistry;

/// Hands out monotonically increasing ids.
///
/// An id is only consumed once [`IdAllocator::commit`] is called, which the
/// stores do after the insert has been committed to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdAllocator {
    last: i64,
}

impl IdAllocator {
    /// Create an allocator that continues after `last`.
    #[must_use]
    pub fn seeded(last: i64) -> Self {
        Self { last: last.max(0) }
    }

    /// The id the next insertion will receive.
    #[must_use]
    pub fn next(&self) -> i64 {
        self.last + 1
    }

    /// Record that `id` has been used.
    pub fn commit(&mut self, id: i64) {
        self.last = self.last.max(id);
    }

    /// The highest id handed out so far.
    #[must_use]
    pub fn last(&self) -> i64 {
        self.last
    }
}

/// State guarded by the database mutex.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) storage: Storage,
    pub(crate) track_ids: IdAllocator,
    pub(crate) webhook_ids: IdAllocator,
    /// Arrival timestamp of the most recent insertion.
    pub(crate) last_arrival: i64,
}

impl Inner {
    /// Arrival timestamp for a track inserted now.
    ///
    /// Strictly greater than every earlier arrival, even if the wall clock
    /// stalls or steps backwards.
    pub(crate) fn next_arrival(&self) -> i64 {
        Utc::now().timestamp_millis().max(self.last_arrival + 1)
    }
}

/// Point-in-time view used by the change notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSnapshot {
    /// Number of stored tracks.
    pub track_count: u64,
    /// Arrival timestamp of the newest track.
    pub latest_timestamp: Option<i64>,
    /// Ids of the tracks beyond the requested baseline, ascending.
    pub recent_track_ids: Vec<TrackId>,
    /// All registered webhooks, ascending by id.
    pub webhooks: Vec<WebhookSubscription>,
}

/// Cloneable handle to the shared database.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<Mutex<Inner>>,
}

impl Database {
    /// Open or create the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_storage(Storage::open(path)?)
    }

    /// Create an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_storage(Storage::open_in_memory()?)
    }

    /// Wrap an opened storage, seeding the allocators from its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted high-water marks cannot be read.
    pub fn from_storage(storage: Storage) -> Result<Self> {
        let track_ids = IdAllocator::seeded(storage.last_track_id()?);
        let webhook_ids = IdAllocator::seeded(storage.last_webhook_id()?);
        let last_arrival = storage.latest_arrival()?.unwrap_or(0);

        info!(
            "Next track id {}, next webhook id {}",
            track_ids.next(),
            webhook_ids.next()
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                storage,
                track_ids,
                webhook_ids,
                last_arrival,
            })),
        })
    }

    /// The track store view.
    #[must_use]
    pub fn tracks(&self) -> TrackStore {
        TrackStore::new(self.clone())
    }

    /// The webhook registry view.
    #[must_use]
    pub fn webhooks(&self) -> WebhookRegistry {
        WebhookRegistry::new(self.clone())
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        self.with(|inner| inner.storage.stats())
    }

    /// Read the track count, the newest arrivals and the webhook list as one
    /// consistent snapshot.
    ///
    /// `since` is a track count; the ids of the tracks beyond it are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn change_snapshot(&self, since: u64) -> Result<ChangeSnapshot> {
        self.with(|inner| {
            let track_count = inner.storage.count_tracks()?;
            let recent_track_ids = inner
                .storage
                .recent_track_ids(track_count.saturating_sub(since))?;
            Ok(ChangeSnapshot {
                track_count,
                latest_timestamp: inner.storage.latest_arrival()?,
                recent_track_ids,
                webhooks: inner.storage.all_webhooks()?,
            })
        })
    }

    /// Run `f` with exclusive access to the storage and allocators.
    pub(crate) fn with<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        f(&mut guard)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every write is a committed-or-rolled-back transaction, so the state
        // behind a poisoned lock is still consistent
        self.inner.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("Recovering database lock after a panic");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::sample_track;

    #[test]
    fn test_id_allocator() {
        let mut ids = IdAllocator::seeded(0);
        assert_eq!(ids.next(), 1);
        ids.commit(1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.last(), 1);
    }

    #[test]
    fn test_id_allocator_never_moves_backwards() {
        let mut ids = IdAllocator::seeded(10);
        ids.commit(3);
        assert_eq!(ids.next(), 11);
    }

    #[test]
    fn test_id_allocator_negative_seed() {
        assert_eq!(IdAllocator::seeded(-5).next(), 1);
    }

    #[test]
    fn test_change_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let tracks = db.tracks();
        for i in 0..4 {
            tracks
                .add(&sample_track(&format!("http://example.com/{i}.igc")))
                .unwrap();
        }
        db.webhooks().register("http://hooks.example/a", None).unwrap();

        let snapshot = db.change_snapshot(1).unwrap();
        assert_eq!(snapshot.track_count, 4);
        assert_eq!(snapshot.recent_track_ids, vec![2, 3, 4]);
        assert_eq!(snapshot.webhooks.len(), 1);
        assert_eq!(
            snapshot.latest_timestamp,
            Some(tracks.get(4).unwrap().unwrap().arrival_timestamp)
        );
    }

    #[test]
    fn test_change_snapshot_since_beyond_count() {
        let db = Database::open_in_memory().unwrap();
        let snapshot = db.change_snapshot(10).unwrap();
        assert_eq!(snapshot.track_count, 0);
        assert!(snapshot.recent_track_ids.is_empty());
        assert!(snapshot.latest_timestamp.is_none());
    }

    #[test]
    fn test_reopen_seeds_allocators() {
        let db_path = std::env::temp_dir().join(format!(
            "trackfeed_db_reopen_{}.db",
            std::process::id()
        ));

        {
            let db = Database::open(&db_path).unwrap();
            let tracks = db.tracks();
            for i in 0..3 {
                tracks
                    .add(&sample_track(&format!("http://example.com/{i}.igc")))
                    .unwrap();
            }
            tracks.delete_all().unwrap();
            db.webhooks().register("http://hooks.example/a", None).unwrap();
        }

        let db = Database::open(&db_path).unwrap();
        let outcome = db
            .tracks()
            .add(&sample_track("http://example.com/new.igc"))
            .unwrap();
        assert_eq!(outcome.id(), 4);
        assert_eq!(
            db.webhooks().register("http://hooks.example/b", None).unwrap(),
            2
        );

        drop(db);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }
}
