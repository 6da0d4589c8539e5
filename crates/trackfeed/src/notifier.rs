//! Background change detection and webhook notification.
//!
//! The [`ChangeNotifier`] wakes on a fixed interval, compares the track count
//! with the last count it observed and, when the store has grown, posts a
//! [`Notification`] to every webhook whose trigger threshold is met.
//!
//! Each webhook keeps its own baseline: the count at which it was last
//! notified, or the notifier's last observed count when the webhook was first
//! seen. A webhook with `min_trigger_count = 3` therefore fires once three
//! tracks have accumulated, even when they arrive over several ticks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::track::TrackId;
use crate::webhook::{Notification, NotificationTransport, WebhookId};

/// The notifier's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierState {
    /// Waiting for the next tick.
    Idle {
        /// Track count observed at the end of the last tick.
        last_seen: u64,
    },
    /// A tick is in progress.
    Checking {
        /// Track count observed at the end of the previous tick.
        last_seen: u64,
    },
}

impl NotifierState {
    /// The last observed track count.
    #[must_use]
    pub fn last_seen(&self) -> u64 {
        match self {
            Self::Idle { last_seen } | Self::Checking { last_seen } => *last_seen,
        }
    }

    /// Whether the notifier is between ticks.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle { .. })
    }
}

/// What a single tick observed and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Track count read during the tick.
    pub track_count: u64,
    /// Growth since the previous tick (zero when the count fell or held).
    pub growth: u64,
    /// Webhooks that were notified successfully.
    pub dispatched: Vec<WebhookId>,
    /// Webhooks whose delivery failed.
    pub failed: Vec<WebhookId>,
}

/// Watches the track store and notifies webhooks about new tracks.
#[derive(Debug)]
pub struct ChangeNotifier {
    db: Database,
    transport: Arc<dyn NotificationTransport>,
    interval: Duration,
    state: NotifierState,
    baselines: HashMap<WebhookId, u64>,
    cancel: CancellationToken,
}

impl ChangeNotifier {
    /// Create a notifier whose first observation is the current track count.
    ///
    /// # Errors
    ///
    /// Returns an error if the track count cannot be read.
    pub fn new(
        db: Database,
        transport: Arc<dyn NotificationTransport>,
        interval: Duration,
    ) -> Result<Self> {
        let last_seen = db.tracks().count()?;
        Ok(Self {
            db,
            transport,
            interval,
            state: NotifierState::Idle { last_seen },
            baselines: HashMap::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> NotifierState {
        self.state
    }

    /// Token that stops [`ChangeNotifier::run`] when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one check.
    ///
    /// On failure no notification is sent and the last observed count is
    /// kept, so the next tick retries the same comparison.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read. Delivery failures are
    /// reported in the [`TickReport`], not as errors.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let last_seen = self.state.last_seen();
        self.state = NotifierState::Checking { last_seen };

        let result = self.check(last_seen).await;

        let last_seen = result.as_ref().map_or(last_seen, |r| r.track_count);
        self.state = NotifierState::Idle { last_seen };
        result
    }

    async fn check(&mut self, last_seen: u64) -> Result<TickReport> {
        let started = Instant::now();
        let floor = self
            .baselines
            .values()
            .copied()
            .fold(last_seen, u64::min);
        let snapshot = self.db.change_snapshot(floor)?;
        let current = snapshot.track_count;

        self.baselines
            .retain(|id, _| snapshot.webhooks.iter().any(|w| w.id == *id));

        let mut report = TickReport {
            track_count: current,
            growth: current.saturating_sub(last_seen),
            ..TickReport::default()
        };

        if current <= last_seen {
            if current < last_seen {
                debug!("Track count fell from {} to {}", last_seen, current);
            }
            for baseline in self.baselines.values_mut() {
                *baseline = (*baseline).min(current);
            }
            for webhook in &snapshot.webhooks {
                self.baselines.entry(webhook.id).or_insert(current);
            }
            return Ok(report);
        }

        debug!(
            "Track count grew from {} to {}, checking {} webhooks",
            last_seen,
            current,
            snapshot.webhooks.len()
        );

        for webhook in &snapshot.webhooks {
            let baseline = *self.baselines.entry(webhook.id).or_insert(last_seen);
            let pending = current.saturating_sub(baseline);
            if pending < u64::from(webhook.min_trigger_count) {
                continue;
            }

            let notification = Notification::new_tracks(
                newest(&snapshot.recent_track_ids, pending),
                snapshot.latest_timestamp,
                elapsed_millis(started),
            );

            match self.transport.send(&webhook.url, &notification).await {
                Ok(()) => {
                    info!(
                        "Notified webhook {} of {} new tracks",
                        webhook.id,
                        notification.tracks.len()
                    );
                    report.dispatched.push(webhook.id);
                }
                Err(e) => {
                    warn!("Notification to webhook {} failed: {}", webhook.id, e);
                    report.failed.push(webhook.id);
                }
            }
            self.baselines.insert(webhook.id, current);
        }

        Ok(report)
    }

    /// Tick every interval until cancelled, then return the final state.
    ///
    /// The first check happens one interval after the call.
    pub async fn run(mut self) -> NotifierState {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            "Change notifier started (interval {:?}, {} tracks)",
            self.interval,
            self.state.last_seen()
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Change check failed: {}", e);
                    }
                }
            }
        }

        info!("Change notifier stopped");
        self.state
    }

    /// Run on a background task.
    #[must_use]
    pub fn spawn(self) -> NotifierHandle {
        let cancel = self.cancellation_token();
        let task = tokio::spawn(self.run());
        NotifierHandle { cancel, task }
    }
}

/// Handle to a spawned [`ChangeNotifier`].
#[derive(Debug)]
pub struct NotifierHandle {
    cancel: CancellationToken,
    task: JoinHandle<NotifierState>,
}

impl NotifierHandle {
    /// Stop the notifier and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the notifier task panicked.
    pub async fn shutdown(self) -> Result<NotifierState> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| Error::internal(format!("notifier task failed: {e}")))
    }
}

/// The last `count` ids of an ascending list.
fn newest(ids: &[TrackId], count: u64) -> Vec<TrackId> {
    let count = usize::try_from(count).unwrap_or(usize::MAX).min(ids.len());
    ids[ids.len() - count..].to_vec()
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TrackStore;
    use crate::track::sample_track;
    use crate::webhook::testing::RecordingTransport;

    struct Fixture {
        db: Database,
        transport: Arc<RecordingTransport>,
        notifier: ChangeNotifier,
        added: usize,
    }

    impl Fixture {
        fn new() -> Self {
            crate::logging::init_test_logging();
            let db = Database::open_in_memory().unwrap();
            let transport = Arc::new(RecordingTransport::default());
            let notifier =
                ChangeNotifier::new(db.clone(), transport.clone(), Duration::from_secs(600))
                    .unwrap();
            Self {
                db,
                transport,
                notifier,
                added: 0,
            }
        }

        fn tracks(&self) -> TrackStore {
            self.db.tracks()
        }

        fn add_tracks(&mut self, n: usize) {
            let tracks = self.tracks();
            for _ in 0..n {
                self.added += 1;
                tracks
                    .add(&sample_track(&format!(
                        "http://example.com/{}.igc",
                        self.added
                    )))
                    .unwrap();
            }
        }

        fn register(&self, url: &str, min: i64) -> WebhookId {
            self.db.webhooks().register(url, Some(min)).unwrap()
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_current_count() {
        let db = Database::open_in_memory().unwrap();
        db.tracks().add(&sample_track("http://example.com/a.igc")).unwrap();
        let notifier = ChangeNotifier::new(
            db,
            Arc::new(RecordingTransport::default()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(notifier.state(), NotifierState::Idle { last_seen: 1 });
    }

    #[tokio::test]
    async fn test_no_growth_no_dispatch() {
        let mut f = Fixture::new();
        f.register("http://hooks.example/a", 1);

        let report = f.notifier.tick().await.unwrap();
        assert_eq!(report.growth, 0);
        assert!(report.dispatched.is_empty());
        assert!(f.transport.sent().is_empty());
        assert!(f.notifier.state().is_idle());
    }

    #[tokio::test]
    async fn test_threshold_accumulates_across_ticks() {
        let mut f = Fixture::new();
        let hook = f.register("http://hooks.example/a", 3);

        f.add_tracks(2);
        let report = f.notifier.tick().await.unwrap();
        assert_eq!(report.growth, 2);
        assert!(report.dispatched.is_empty());

        f.add_tracks(1);
        let report = f.notifier.tick().await.unwrap();
        assert_eq!(report.dispatched, vec![hook]);

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "http://hooks.example/a");
        assert_eq!(sent[0].1.tracks, vec![1, 2, 3]);
        assert_eq!(
            sent[0].1.t_latest,
            f.tracks().latest_timestamp().unwrap()
        );

        // Nothing new: no further dispatch
        let report = f.notifier.tick().await.unwrap();
        assert!(report.dispatched.is_empty());
        assert_eq!(f.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_one_dispatch_per_growth_event() {
        let mut f = Fixture::new();
        let low = f.register("http://hooks.example/low", 1);
        let high = f.register("http://hooks.example/high", 5);

        f.add_tracks(2);
        let report = f.notifier.tick().await.unwrap();
        assert_eq!(report.dispatched, vec![low]);

        f.add_tracks(3);
        let report = f.notifier.tick().await.unwrap();
        assert_eq!(report.dispatched, vec![low, high]);

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].1.tracks, vec![3, 4, 5]);
        assert_eq!(sent[2].1.tracks, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_delete_all_does_not_notify() {
        let mut f = Fixture::new();
        f.register("http://hooks.example/a", 1);
        f.add_tracks(3);
        f.notifier.tick().await.unwrap();
        assert_eq!(f.transport.sent().len(), 1);

        f.tracks().delete_all().unwrap();
        let report = f.notifier.tick().await.unwrap();
        assert!(report.dispatched.is_empty());
        assert_eq!(f.notifier.state(), NotifierState::Idle { last_seen: 0 });

        // Growth after the resync is measured from the new count
        f.add_tracks(1);
        let report = f.notifier.tick().await.unwrap();
        assert_eq!(report.growth, 1);
        let sent = f.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1.tracks, vec![4]);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_block_others() {
        let mut f = Fixture::new();
        let bad = f.register("http://fail.example/hook", 1);
        let good = f.register("http://hooks.example/a", 1);

        f.add_tracks(1);
        let report = f.notifier.tick().await.unwrap();
        assert_eq!(report.failed, vec![bad]);
        assert_eq!(report.dispatched, vec![good]);

        // No retry on the next tick
        let report = f.notifier.tick().await.unwrap();
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_late_webhook_not_notified_retroactively() {
        let mut f = Fixture::new();
        f.add_tracks(2);
        f.notifier.tick().await.unwrap();

        f.register("http://hooks.example/late", 1);
        let report = f.notifier.tick().await.unwrap();
        assert!(report.dispatched.is_empty());
        assert!(f.transport.sent().is_empty());

        f.add_tracks(1);
        f.notifier.tick().await.unwrap();
        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.tracks, vec![3]);
    }

    #[tokio::test]
    async fn test_deleted_webhook_is_forgotten() {
        let mut f = Fixture::new();
        let hook = f.register("http://hooks.example/a", 1);
        f.add_tracks(1);
        f.notifier.tick().await.unwrap();

        f.db.webhooks().delete(hook).unwrap();
        f.add_tracks(1);
        let report = f.notifier.tick().await.unwrap();
        assert!(report.dispatched.is_empty());
        assert!(f.notifier.baselines.is_empty());
    }

    #[tokio::test]
    async fn test_failed_check_keeps_last_seen() {
        let mut f = Fixture::new();
        f.add_tracks(2);
        f.notifier.tick().await.unwrap();

        f.db
            .with(|inner| {
                inner.storage.connection().execute_batch("DROP TABLE tracks")?;
                Ok(())
            })
            .unwrap();

        assert!(f.notifier.tick().await.is_err());
        assert_eq!(f.notifier.state(), NotifierState::Idle { last_seen: 2 });
    }

    #[tokio::test]
    async fn test_cancel_stops_run() {
        let f = Fixture::new();
        let handle = f.notifier.spawn();
        let state = handle.shutdown().await.unwrap();
        assert_eq!(state, NotifierState::Idle { last_seen: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval() {
        let mut f = Fixture::new();
        f.register("http://hooks.example/a", 1);
        let transport = f.transport.clone();
        f.add_tracks(1);

        let handle = f.notifier.spawn();
        tokio::time::sleep(Duration::from_secs(601)).await;
        let state = handle.shutdown().await.unwrap();

        assert_eq!(state.last_seen(), 1);
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_newest() {
        assert_eq!(newest(&[1, 2, 3, 4], 2), vec![3, 4]);
        assert_eq!(newest(&[1, 2], 5), vec![1, 2]);
        assert!(newest(&[], 3).is_empty());
    }
}
