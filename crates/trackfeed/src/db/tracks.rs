//! The track store.

use tracing::{debug, info};

use crate::db::Database;
use crate::error::Result;
use crate::track::{AddOutcome, NewTrack, TrackId, TrackRecord};

/// Durable, deduplicating collection of tracks.
///
/// Ids are strictly increasing in insertion order and never reused, arrival
/// timestamps are strictly increasing in id order, and a `source_key` is
/// stored at most once.
#[derive(Debug, Clone)]
pub struct TrackStore {
    db: Database,
}

impl TrackStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a track unless one with the same source key is already stored.
    ///
    /// A resubmission returns [`AddOutcome::Duplicate`] with the existing id
    /// and leaves the store untouched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the persistence call
    /// fails; no id is consumed in that case.
    pub fn add(&self, track: &NewTrack) -> Result<AddOutcome> {
        self.db.with(|inner| {
            if let Some(existing) = inner
                .storage
                .find_track_id_by_source_key(&track.source_key)?
            {
                debug!(
                    "Skipping duplicate track {} (already stored as {})",
                    track.source_url, existing
                );
                return Ok(AddOutcome::Duplicate(existing));
            }

            let id = inner.track_ids.next();
            let arrival = inner.next_arrival();
            inner.storage.insert_track(id, track, arrival)?;
            inner.track_ids.commit(id);
            inner.last_arrival = arrival;

            info!("Added track {} from {}", id, track.source_url);
            Ok(AddOutcome::Inserted(id))
        })
    }

    /// Id of the track stored under `source_key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn find_by_source_key(&self, source_key: &str) -> Result<Option<TrackId>> {
        self.db
            .with(|inner| inner.storage.find_track_id_by_source_key(source_key))
    }

    /// Get a track by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn get(&self, id: TrackId) -> Result<Option<TrackRecord>> {
        self.db.with(|inner| inner.storage.get_track(id))
    }

    /// All tracks in ascending id (and arrival) order.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn get_all(&self) -> Result<Vec<TrackRecord>> {
        self.db.with(|inner| inner.storage.all_tracks())
    }

    /// All track ids in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn ids(&self) -> Result<Vec<TrackId>> {
        self.db.with(|inner| inner.storage.track_ids())
    }

    /// Number of stored tracks.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn count(&self) -> Result<u64> {
        self.db.with(|inner| inner.storage.count_tracks())
    }

    /// Arrival timestamp of the newest track.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn latest_timestamp(&self) -> Result<Option<i64>> {
        self.db.with(|inner| inner.storage.latest_arrival())
    }

    /// Remove every track and return how many were removed.
    ///
    /// Id allocation continues from where it was; removed ids are not reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn delete_all(&self) -> Result<u64> {
        self.db.with(|inner| inner.storage.delete_all_tracks())
    }

    /// The highest id ever assigned, or 0 if none.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn last_id(&self) -> Result<TrackId> {
        self.db.with(|inner| {
            let persisted = inner.storage.last_track_id()?;
            Ok(persisted.max(inner.track_ids.last()))
        })
    }
}
