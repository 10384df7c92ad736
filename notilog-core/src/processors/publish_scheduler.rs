//! PublishScheduler processor.
//!
//! The PublishScheduler is responsible for:
//! - Running a publish cycle every `interval`, stretched by exponential
//!   backoff while cycles keep failing
//! - Running a cycle right away on `PublishTick` nudges (appends, admin),
//!   unless a failed cycle is backing off
//! - Retrying tracker conflicts immediately from a fresh cursor
//! - Publishing a [`PublisherStatus`] snapshot on a watch channel
//! - Picking up publisher config reloads without a restart

use std::sync::Arc;
use std::time::Duration;

use kanau::processor::Processor;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, ConfigWatcher, PublisherConfig};
use crate::events::{PublishTick, PublishTickReceiver};
use crate::utils::backoff::next_publish_delay;

use super::publisher::{NotificationPublisher, PublishError, PublishOutcome};

/// Observable state of the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherStatus {
    pub running: bool,
    /// Tracker cursor as of the last successful cycle.
    pub cursor: Option<u64>,
    pub consecutive_failures: u32,
    pub last_outcome: Option<PublishOutcome>,
    pub last_error: Option<String>,
    pub last_success_at: Option<time::OffsetDateTime>,
    pub last_attempt_at: Option<time::OffsetDateTime>,
}

pub struct PublishScheduler<P> {
    publisher: Arc<P>,
    config: ConfigStore<PublisherConfig>,
    status_tx: watch::Sender<PublisherStatus>,
}

impl<P: NotificationPublisher> PublishScheduler<P> {
    pub fn new(publisher: Arc<P>, config: ConfigStore<PublisherConfig>) -> Self {
        let (status_tx, _) = watch::channel(PublisherStatus::default());
        Self {
            publisher,
            config,
            status_tx,
        }
    }

    /// Subscribe to status snapshots. Valid before and after `run`.
    pub fn status(&self) -> watch::Receiver<PublisherStatus> {
        self.status_tx.subscribe()
    }

    /// Delay until the next timer-driven cycle.
    fn next_delay(&self) -> Duration {
        next_publish_delay(
            self.config.read().interval,
            self.status_tx.borrow().consecutive_failures,
        )
    }

    /// Whether the last cycle failed and the backoff delay is still running.
    fn backing_off(&self) -> bool {
        self.status_tx.borrow().consecutive_failures > 0
    }

    /// Run the scheduler until shutdown is signaled.
    ///
    /// A cycle in progress is always finished before the shutdown signal is
    /// looked at, so the tracker is never left mid-advance. The timer is
    /// measured from the end of the last cycle. While backing off, nudges
    /// are absorbed and the timer alone retries.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut tick_rx: PublishTickReceiver,
        mut config_watcher: ConfigWatcher<PublisherConfig>,
    ) {
        self.status_tx.send_modify(|s| s.running = true);
        info!(exchange = %self.config.read().exchange, "PublishScheduler started");
        let mut last_cycle = Instant::now();

        loop {
            let due = last_cycle + self.next_delay();
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("PublishScheduler received shutdown signal");
                        break;
                    }
                }

                Ok(config) = config_watcher.changed() => {
                    info!(
                        enabled = config.enabled,
                        interval = ?config.interval,
                        max_conflict_retries = config.max_conflict_retries,
                        "PublishScheduler reloaded config"
                    );
                }

                Some(tick) = tick_rx.recv() => {
                    if self.backing_off() {
                        debug!(%tick, "Backing off, tick deferred to the retry timer");
                        continue;
                    }
                    let _ = self.process(tick).await;
                    last_cycle = Instant::now();
                }

                _ = tokio::time::sleep_until(due) => {
                    let _ = self.process(PublishTick::Timer).await;
                    last_cycle = Instant::now();
                }
            }
        }

        self.status_tx.send_modify(|s| s.running = false);
        info!("PublishScheduler shutdown complete");
    }

    /// One cycle, retrying tracker conflicts up to the configured limit.
    async fn publish_with_retries(&self, max_retries: u32) -> Result<PublishOutcome, PublishError> {
        let mut conflicts = 0;
        loop {
            match self.publisher.publish_notifications().await {
                Err(PublishError::TrackerConflict { expected }) if conflicts < max_retries => {
                    conflicts += 1;
                    warn!(expected, attempt = conflicts, "Tracker conflict, retrying cycle");
                }
                result => return result,
            }
        }
    }

    fn record(&self, result: &Result<PublishOutcome, PublishError>) {
        let now = time::OffsetDateTime::now_utc();
        self.status_tx.send_modify(|status| {
            status.last_attempt_at = Some(now);
            match result {
                Ok(outcome) => {
                    status.cursor = Some(outcome.cursor_after);
                    status.consecutive_failures = 0;
                    status.last_outcome = Some(*outcome);
                    status.last_error = None;
                    status.last_success_at = Some(now);
                }
                Err(e) => {
                    status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                    status.last_error = Some(e.to_string());
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Processor trait implementation
// ---------------------------------------------------------------------------

impl<P: NotificationPublisher> Processor<PublishTick> for PublishScheduler<P> {
    /// `None` when publishing is disabled.
    type Output = Option<PublishOutcome>;
    type Error = PublishError;

    async fn process(&self, tick: PublishTick) -> Result<Option<PublishOutcome>, PublishError> {
        let config = self.config.read();
        if !config.enabled {
            debug!(%tick, "Publishing disabled, ignoring tick");
            return Ok(None);
        }

        debug!(%tick, "Running publish cycle");
        let result = self.publish_with_retries(config.max_conflict_retries).await;
        self.record(&result);

        match &result {
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                warn!(error = %e, failures = self.status_tx.borrow().consecutive_failures, "Publish cycle failed");
            }
            Err(e) => {
                error!(error = %e, "Publish cycle failed, operator action required");
            }
        }
        result.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::events::publish_tick_channel;
    use crate::notification::tests::user_registered;
    use crate::processors::publisher::tests::{FlakyBus, publisher, store_with};
    use crate::store::{EventStore, NewEvent};
    use crate::tracker::{InMemoryTrackerStore, PublishedNotificationTrackerStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a tracker conflict a fixed number of times, then succeeds.
    struct ConflictingPublisher {
        conflicts_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl NotificationPublisher for ConflictingPublisher {
        async fn publish_notifications(&self) -> Result<PublishOutcome, PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.conflicts_left.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts_left.store(left - 1, Ordering::SeqCst);
                return Err(PublishError::TrackerConflict { expected: 0 });
            }
            Ok(PublishOutcome {
                published: 1,
                cursor_before: 0,
                cursor_after: 1,
            })
        }

        fn internal_only_test_confirmation(&self) -> Result<bool, PublishError> {
            Err(PublishError::UnsupportedOperation)
        }
    }

    fn conflicting(conflicts: u32) -> Arc<ConflictingPublisher> {
        Arc::new(ConflictingPublisher {
            conflicts_left: AtomicU32::new(conflicts),
            calls: AtomicU32::new(0),
        })
    }

    fn config(max_conflict_retries: u32) -> ConfigStore<PublisherConfig> {
        ConfigStore::new(PublisherConfig {
            exchange: "identity".into(),
            max_conflict_retries,
            ..PublisherConfig::default()
        })
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let inner = conflicting(2);
        let scheduler = PublishScheduler::new(inner.clone(), config(3));
        let outcome = scheduler.process(PublishTick::Manual).await.unwrap();
        assert_eq!(outcome.map(|o| o.published), Some(1));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);

        let inner = conflicting(5);
        let scheduler = PublishScheduler::new(inner.clone(), config(1));
        let err = scheduler.process(PublishTick::Manual).await.unwrap_err();
        assert!(matches!(err, PublishError::TrackerConflict { expected: 0 }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.status().borrow().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_disabled_publisher_ignores_ticks() {
        let inner = conflicting(0);
        let store = config(0);
        store.update(PublisherConfig {
            enabled: false,
            ..PublisherConfig::default()
        });
        let scheduler = PublishScheduler::new(inner.clone(), store);
        assert_eq!(scheduler.process(PublishTick::Timer).await.unwrap(), None);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_tracks_failures_and_recovery() {
        let store = store_with(3).await;
        let tracker = Arc::new(InMemoryTrackerStore::new("identity"));
        let bus = InMemoryBus::new();
        let flaky = FlakyBus::failing_send(bus.clone(), 1);
        let publisher = Arc::new(publisher(store, tracker.clone(), Arc::new(flaky), None));
        let scheduler = PublishScheduler::new(publisher, config(0));
        let status = scheduler.status();

        assert!(scheduler.process(PublishTick::Manual).await.is_err());
        {
            let snapshot = status.borrow();
            assert_eq!(snapshot.consecutive_failures, 1);
            assert!(snapshot.last_error.is_some());
            assert!(snapshot.last_success_at.is_none());
        }
        assert_eq!(scheduler.next_delay(), Duration::from_secs(2));

        scheduler.process(PublishTick::Manual).await.unwrap();
        let snapshot = status.borrow().clone();
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.cursor, Some(3));
        assert_eq!(snapshot.last_outcome.map(|o| o.published), Some(3));
        assert!(snapshot.last_error.is_none());
        assert_eq!(scheduler.next_delay(), Duration::from_secs(1));
        assert_eq!(tracker.read().await.unwrap().most_recent_published_notification_id, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_on_nudge_and_timer_until_shutdown() {
        let store = store_with(2).await;
        let tracker = Arc::new(InMemoryTrackerStore::new("identity"));
        let bus = InMemoryBus::new();
        let publisher = Arc::new(publisher(
            store.clone(),
            tracker.clone(),
            Arc::new(bus.clone()),
            None,
        ));
        let config_store = config(0);
        let watcher = config_store.subscribe();
        let scheduler = PublishScheduler::new(publisher, config_store.clone());
        let mut status = scheduler.status();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tick_tx, tick_rx) = publish_tick_channel();
        let handle = tokio::spawn(scheduler.run(shutdown_rx, tick_rx, watcher));

        assert!(tick_tx.nudge(PublishTick::EventAppended { event_id: 2 }));
        status
            .wait_for(|s| s.cursor == Some(2))
            .await
            .unwrap();

        store
            .append(NewEvent::from_domain_event(&user_registered("late")).unwrap())
            .await
            .unwrap();
        // No nudge: the timer picks it up.
        status
            .wait_for(|s| s.cursor == Some(3))
            .await
            .unwrap();
        assert_eq!(bus.delivered("identity").await.len(), 3);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(!status.borrow().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nudges_wait_for_backoff_after_failure() {
        let store = store_with(3).await;
        let tracker = Arc::new(InMemoryTrackerStore::new("identity"));
        let bus = InMemoryBus::new();
        let flaky = FlakyBus::failing_send(bus.clone(), 1);
        let publisher = Arc::new(publisher(store, tracker.clone(), Arc::new(flaky), None));
        let config_store = ConfigStore::new(PublisherConfig {
            exchange: "identity".into(),
            interval: Duration::from_secs(10),
            ..PublisherConfig::default()
        });
        let watcher = config_store.subscribe();
        let scheduler = PublishScheduler::new(publisher, config_store);
        let mut status = scheduler.status();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tick_tx, tick_rx) = publish_tick_channel();
        let handle = tokio::spawn(scheduler.run(shutdown_rx, tick_rx, watcher));

        assert!(tick_tx.nudge(PublishTick::Manual));
        status
            .wait_for(|s| s.consecutive_failures == 1)
            .await
            .unwrap();
        let failed_at = Instant::now();

        // Appends keep nudging during the outage; none of them may retry early.
        for event_id in 4..7 {
            assert!(tick_tx.nudge(PublishTick::EventAppended { event_id }));
        }
        status
            .wait_for(|s| s.cursor == Some(3))
            .await
            .unwrap();
        assert!(failed_at.elapsed() >= Duration::from_secs(20));
        assert_eq!(status.borrow().consecutive_failures, 0);
        assert_eq!(bus.delivered("identity").await.len(), 3);
        assert_eq!(tracker.read().await.unwrap().most_recent_published_notification_id, 3);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
