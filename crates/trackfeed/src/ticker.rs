//! Cursor-based paging over tracks in arrival order.
//!
//! A client walks the feed by passing the `t_stop` of the page it just read
//! as the cursor for the next request. Paging is a pure function of the
//! ordered tracks, so it can be computed from any consistent snapshot.

use std::time::Instant;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::track::{TrackId, TrackRecord};

/// Number of track ids returned per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// One page of the ticker feed.
///
/// All timestamps, and therefore cursors, are arrival times in milliseconds
/// since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerPage {
    /// Arrival timestamp of the newest stored track.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_latest: Option<i64>,
    /// Arrival timestamp of the first track on this page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_start: Option<i64>,
    /// Arrival timestamp of the last track on this page; the next cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_stop: Option<i64>,
    /// Ids on this page, ascending.
    pub tracks: Vec<TrackId>,
    /// Time spent building the page, in milliseconds.
    pub processing: u64,
}

/// Result of a ticker request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerOutcome {
    /// A page of tracks (possibly empty when the store is empty).
    Page(TickerPage),
    /// The cursor is already at the newest track.
    NoNewTracks,
}

/// Splits the track list into fixed-size pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerPager {
    page_size: usize,
}

impl Default for TickerPager {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl TickerPager {
    /// Create a pager. A page size of zero is treated as one.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    /// The number of ids per page.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Compute the page following `cursor`.
    ///
    /// `tracks` must be ordered by ascending id, which is also ascending
    /// arrival order. Without a cursor the page starts at the oldest track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCursor`] if `cursor` is not the arrival
    /// timestamp of a stored track.
    pub fn page(&self, tracks: &[TrackRecord], cursor: Option<i64>) -> Result<TickerOutcome> {
        let started = Instant::now();

        let start = match cursor {
            None => 0,
            Some(cursor) => {
                let pos = tracks.partition_point(|t| t.arrival_timestamp < cursor);
                match tracks.get(pos) {
                    Some(track) if track.arrival_timestamp == cursor => pos + 1,
                    _ => return Err(Error::InvalidCursor { cursor }),
                }
            }
        };

        if cursor.is_some() && start >= tracks.len() {
            return Ok(TickerOutcome::NoNewTracks);
        }

        let end = start.saturating_add(self.page_size).min(tracks.len());
        let window = &tracks[start..end];

        Ok(TickerOutcome::Page(TickerPage {
            t_latest: tracks.last().map(|t| t.arrival_timestamp),
            t_start: window.first().map(|t| t.arrival_timestamp),
            t_stop: window.last().map(|t| t.arrival_timestamp),
            tracks: window.iter().map(|t| t.id).collect(),
            processing: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: TrackId, arrival_timestamp: i64) -> TrackRecord {
        TrackRecord {
            id,
            source_key: format!("key-{id}"),
            source_url: format!("http://example.com/{id}.igc"),
            pilot: "Pilot".to_string(),
            glider: "Glider".to_string(),
            glider_id: "G-1".to_string(),
            distance: 1.0,
            date: None,
            arrival_timestamp,
        }
    }

    fn seven_tracks() -> Vec<TrackRecord> {
        (1..=7).map(|id| record(id, 1_000 + id * 10)).collect()
    }

    fn expect_page(outcome: TickerOutcome) -> TickerPage {
        match outcome {
            TickerOutcome::Page(page) => page,
            TickerOutcome::NoNewTracks => panic!("expected a page"),
        }
    }

    #[test]
    fn test_walks_seven_tracks() {
        let tracks = seven_tracks();
        let pager = TickerPager::new(5);

        let first = expect_page(pager.page(&tracks, None).unwrap());
        assert_eq!(first.tracks, vec![1, 2, 3, 4, 5]);
        assert_eq!(first.t_start, Some(1_010));
        assert_eq!(first.t_stop, Some(1_050));
        assert_eq!(first.t_latest, Some(1_070));

        let second = expect_page(pager.page(&tracks, first.t_stop).unwrap());
        assert_eq!(second.tracks, vec![6, 7]);
        assert_eq!(second.t_start, Some(1_060));
        assert_eq!(second.t_stop, Some(1_070));

        assert_eq!(
            pager.page(&tracks, second.t_stop).unwrap(),
            TickerOutcome::NoNewTracks
        );
    }

    #[test]
    fn test_empty_store() {
        let page = expect_page(TickerPager::default().page(&[], None).unwrap());
        assert!(page.tracks.is_empty());
        assert!(page.t_latest.is_none());
        assert!(page.t_start.is_none());
        assert!(page.t_stop.is_none());
    }

    #[test]
    fn test_empty_page_serialization_omits_timestamps() {
        let page = expect_page(TickerPager::default().page(&[], None).unwrap());
        let json = serde_json::to_value(&page).unwrap();
        assert!(json.get("t_latest").is_none());
        assert_eq!(json["tracks"], serde_json::json!([]));
    }

    #[test]
    fn test_unknown_cursor_is_rejected() {
        let tracks = seven_tracks();
        let err = TickerPager::default().page(&tracks, Some(1_015)).unwrap_err();
        assert!(matches!(err, Error::InvalidCursor { cursor: 1_015 }));

        let err = TickerPager::default().page(&tracks, Some(9_999)).unwrap_err();
        assert!(matches!(err, Error::InvalidCursor { .. }));
    }

    #[test]
    fn test_cursor_on_empty_store_is_rejected() {
        let err = TickerPager::default().page(&[], Some(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidCursor { .. }));
    }

    #[test]
    fn test_page_never_exceeds_page_size() {
        let tracks: Vec<_> = (1..=23).map(|id| record(id, id)).collect();
        for size in [1, 2, 5, 10, 50] {
            let pager = TickerPager::new(size);
            let mut cursor = None;
            let mut seen = Vec::new();
            while let TickerOutcome::Page(page) = pager.page(&tracks, cursor).unwrap() {
                assert!(page.tracks.len() <= size);
                assert!(!page.tracks.is_empty());
                assert!(page.tracks.windows(2).all(|w| w[0] < w[1]));
                seen.extend(page.tracks);
                cursor = page.t_stop;
            }
            assert_eq!(seen, (1..=23).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_page_size_zero_is_one() {
        let pager = TickerPager::new(0);
        assert_eq!(pager.page_size(), 1);
        let page = expect_page(pager.page(&seven_tracks(), None).unwrap());
        assert_eq!(page.tracks, vec![1]);
    }

    #[test]
    fn test_cursor_mid_list() {
        let tracks = seven_tracks();
        let page = expect_page(TickerPager::new(2).page(&tracks, Some(1_030)).unwrap());
        assert_eq!(page.tracks, vec![4, 5]);
    }
}
