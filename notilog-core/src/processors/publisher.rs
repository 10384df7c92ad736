//! NotificationPublisher.
//!
//! One publish cycle:
//! - Reads the tracker cursor `c` for the exchange
//! - Reads every stored event with id > `c` (or the next `max_batch_size` of them)
//! - Opens one bus channel, sends the notifications strictly in id order
//! - Advances the tracker to the last id sent, by compare-and-swap
//! - Closes the channel, on success and on every failure path
//!
//! The tracker only moves after the bus accepted the whole batch. A failed
//! cycle leaves it untouched and the next cycle resends the batch from the
//! start, so delivery is at-least-once and consumers deduplicate on id.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use compact_str::CompactString;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bus::{BusChannel, BusError, MessageBus, MessageParameters};
use crate::config::PublisherConfig;
use crate::notification::{CodecError, Notification, NotificationSerializer};
use crate::store::{EventStore, StoreError, ensure_contiguous};
use crate::tracker::{PublishedNotificationTrackerStore, TrackerError};

/// Errors that abort a publish cycle.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Another publisher advanced the tracker during this cycle.
    #[error("tracker was advanced concurrently from {expected}")]
    TrackerConflict { expected: u64 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("operation not supported by this publisher")]
    UnsupportedOperation,
}

impl PublishError {
    /// Whether retrying the cycle may succeed without operator action.
    ///
    /// Corrupt or out-of-order records and a tracker asked to move back are
    /// integrity faults and never clear on their own.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::Codec(_)
                | Self::UnsupportedOperation
                | Self::Store(StoreError::InvalidRecord(_) | StoreError::Discontinuity { .. })
                | Self::Tracker(TrackerError::InvalidRecord(_) | TrackerError::Regression { .. })
        )
    }
}

/// Result of one publish cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub published: u64,
    pub cursor_before: u64,
    pub cursor_after: u64,
}

impl PublishOutcome {
    fn idle(cursor: u64) -> Self {
        Self {
            published: 0,
            cursor_before: cursor,
            cursor_after: cursor,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.published == 0
    }
}

#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Run one publish cycle.
    async fn publish_notifications(&self) -> Result<PublishOutcome, PublishError>;

    /// Whether the last cycle delivered anything.
    ///
    /// Only test publishers answer; production ones return
    /// [`PublishError::UnsupportedOperation`].
    fn internal_only_test_confirmation(&self) -> Result<bool, PublishError>;
}

/// Publisher settings fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSettings {
    pub send_timeout: Duration,
    pub max_batch_size: Option<u64>,
}

impl From<&PublisherConfig> for PublisherSettings {
    fn from(config: &PublisherConfig) -> Self {
        Self {
            send_timeout: config.send_timeout,
            max_batch_size: config.max_batch_size,
        }
    }
}

// ---------------------------------------------------------------------------
// BusNotificationPublisher
// ---------------------------------------------------------------------------

/// Publishes stored events to a [`MessageBus`] exchange.
///
/// The exchange is the one the tracker store is bound to. Cycles on the
/// same instance are serialized by an internal lock; across instances the
/// tracker compare-and-swap ensures at most one of them advances over a
/// given range.
pub struct BusNotificationPublisher {
    store: Arc<dyn EventStore>,
    tracker: Arc<dyn PublishedNotificationTrackerStore>,
    bus: Arc<dyn MessageBus>,
    serializer: NotificationSerializer,
    settings: PublisherSettings,
    cycle: Mutex<()>,
}

impl BusNotificationPublisher {
    pub fn new(
        store: Arc<dyn EventStore>,
        tracker: Arc<dyn PublishedNotificationTrackerStore>,
        bus: Arc<dyn MessageBus>,
        serializer: NotificationSerializer,
        settings: PublisherSettings,
    ) -> Self {
        Self {
            store,
            tracker,
            bus,
            serializer,
            settings,
            cycle: Mutex::new(()),
        }
    }

    pub fn exchange_name(&self) -> CompactString {
        CompactString::from(self.tracker.exchange_name())
    }

    fn batch_limit(&self) -> Option<u64> {
        self.settings.max_batch_size.map(|limit| limit.max(1))
    }

    /// Notifications after `cursor`, at most one batch of them.
    async fn unpublished_after(&self, cursor: u64) -> Result<Vec<Notification>, PublishError> {
        let events = match self.batch_limit() {
            Some(limit) => {
                self.store
                    .all_stored_events_between(cursor + 1, cursor.saturating_add(limit))
                    .await?
            }
            None => self.store.all_stored_events_since(cursor).await?,
        };
        ensure_contiguous(&events, cursor + 1)?;
        Ok(Notification::from_stored_events(events))
    }

    async fn send(
        &self,
        channel: &mut dyn BusChannel,
        notification: &Notification,
    ) -> Result<(), PublishError> {
        let parameters = MessageParameters::durable(
            notification.type_name.clone(),
            notification.notification_id.to_string(),
            notification.occurred_on,
        );
        let body = self.serializer.serialize(notification)?;

        let sent = tokio::time::timeout(
            self.settings.send_timeout,
            channel.send(&body, &parameters),
        )
        .await;
        match sent {
            Ok(result) => Ok(result?),
            Err(_) => Err(BusError::Timeout {
                message_id: parameters.message_id.clone(),
                after: self.settings.send_timeout,
            }
            .into()),
        }
    }

    /// Send `batch`, advance, and keep going while sub-batches come back full.
    async fn publish_batches(
        &self,
        channel: &mut dyn BusChannel,
        cursor_before: u64,
        mut batch: Vec<Notification>,
    ) -> Result<PublishOutcome, PublishError> {
        let mut cursor = cursor_before;
        let mut published = 0;

        loop {
            for notification in &batch {
                self.send(channel, notification).await?;
            }
            let Some(last) = batch.last() else {
                break;
            };
            let high = last.notification_id;
            if !self.tracker.compare_and_advance(cursor, high).await? {
                return Err(PublishError::TrackerConflict { expected: cursor });
            }
            debug!(from = cursor, to = high, "Advanced published notification tracker");
            published += batch.len() as u64;
            cursor = high;

            match self.batch_limit() {
                Some(limit) if batch.len() as u64 >= limit => {
                    batch = self.unpublished_after(cursor).await?;
                }
                _ => break,
            }
        }

        Ok(PublishOutcome {
            published,
            cursor_before,
            cursor_after: cursor,
        })
    }
}

#[async_trait]
impl NotificationPublisher for BusNotificationPublisher {
    #[tracing::instrument(skip_all, err, fields(exchange = %self.tracker.exchange_name()))]
    async fn publish_notifications(&self) -> Result<PublishOutcome, PublishError> {
        let _cycle = self.cycle.lock().await;

        let cursor = self
            .tracker
            .read()
            .await?
            .most_recent_published_notification_id;
        let batch = self.unpublished_after(cursor).await?;
        if batch.is_empty() {
            debug!(cursor, "No unpublished notifications");
            return Ok(PublishOutcome::idle(cursor));
        }

        let mut channel = self.bus.open_channel(self.tracker.exchange_name()).await?;
        let result = self.publish_batches(channel.as_mut(), cursor, batch).await;
        if let Err(e) = channel.close().await {
            warn!(error = %e, "Failed to close bus channel");
        }
        drop(channel);

        if let Ok(outcome) = &result {
            info!(
                published = outcome.published,
                cursor = outcome.cursor_after,
                "Published notifications"
            );
        }
        result
    }

    fn internal_only_test_confirmation(&self) -> Result<bool, PublishError> {
        Err(PublishError::UnsupportedOperation)
    }
}

// ---------------------------------------------------------------------------
// ConfirmingNotificationPublisher
// ---------------------------------------------------------------------------

/// Test publisher that remembers whether its last cycle delivered anything.
pub struct ConfirmingNotificationPublisher<P> {
    inner: P,
    confirmed: AtomicBool,
}

impl<P: NotificationPublisher> ConfirmingNotificationPublisher<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            confirmed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<P: NotificationPublisher> NotificationPublisher for ConfirmingNotificationPublisher<P> {
    async fn publish_notifications(&self) -> Result<PublishOutcome, PublishError> {
        let result = self.inner.publish_notifications().await;
        let delivered = matches!(&result, Ok(outcome) if !outcome.is_idle());
        self.confirmed.store(delivered, Ordering::SeqCst);
        result
    }

    fn internal_only_test_confirmation(&self) -> Result<bool, PublishError> {
        Ok(self.confirmed.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::notification::EventTypeRegistry;
    use crate::notification::tests::{UserRegistered, user_registered};
    use crate::store::{InMemoryEventStore, NewEvent};
    use crate::tracker::InMemoryTrackerStore;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    const EXCHANGE: &str = "identity";

    pub(crate) async fn store_with(count: usize) -> Arc<InMemoryEventStore> {
        let store = Arc::new(InMemoryEventStore::new());
        for i in 0..count {
            let event = user_registered(&format!("user-{}", i + 1));
            store
                .append(NewEvent::from_domain_event(&event).unwrap())
                .await
                .unwrap();
        }
        store
    }

    fn serializer() -> NotificationSerializer {
        NotificationSerializer::new(Arc::new(
            EventTypeRegistry::new().register::<UserRegistered>(),
        ))
    }

    fn settings(max_batch_size: Option<u64>) -> PublisherSettings {
        PublisherSettings {
            send_timeout: Duration::from_secs(5),
            max_batch_size,
        }
    }

    pub(crate) fn publisher(
        store: Arc<dyn EventStore>,
        tracker: Arc<dyn PublishedNotificationTrackerStore>,
        bus: Arc<dyn MessageBus>,
        max_batch_size: Option<u64>,
    ) -> BusNotificationPublisher {
        BusNotificationPublisher::new(store, tracker, bus, serializer(), settings(max_batch_size))
    }

    async fn delivered_ids(bus: &InMemoryBus) -> Vec<u64> {
        bus.delivered(EXCHANGE)
            .await
            .iter()
            .map(|m| m.parameters.message_id.parse().unwrap())
            .collect()
    }

    async fn cursor(tracker: &InMemoryTrackerStore) -> u64 {
        tracker
            .read()
            .await
            .unwrap()
            .most_recent_published_notification_id
    }

    /// Wraps [`InMemoryBus`] and fails the n-th send (1-based) exactly once.
    pub(crate) struct FlakyBus {
        pub(crate) inner: InMemoryBus,
        fail_at: usize,
        sends: Arc<AtomicUsize>,
    }

    impl FlakyBus {
        pub(crate) fn failing_send(inner: InMemoryBus, fail_at: usize) -> Self {
            Self {
                inner,
                fail_at,
                sends: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    struct FlakyChannel {
        inner: Box<dyn BusChannel>,
        fail_at: usize,
        sends: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageBus for FlakyBus {
        async fn open_channel(&self, exchange: &str) -> Result<Box<dyn BusChannel>, BusError> {
            Ok(Box::new(FlakyChannel {
                inner: self.inner.open_channel(exchange).await?,
                fail_at: self.fail_at,
                sends: self.sends.clone(),
            }))
        }
    }

    #[async_trait]
    impl BusChannel for FlakyChannel {
        async fn send(
            &mut self,
            body: &Bytes,
            parameters: &MessageParameters,
        ) -> Result<(), BusError> {
            if self.sends.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
                return Err(BusError::SendFailed {
                    message_id: parameters.message_id.clone(),
                    reason: "connection reset".to_string(),
                });
            }
            self.inner.send(body, parameters).await
        }

        async fn close(&mut self) -> Result<(), BusError> {
            self.inner.close().await
        }
    }

    /// A bus whose sends never complete.
    struct StallingBus {
        inner: InMemoryBus,
    }

    struct StallingChannel {
        _inner: Box<dyn BusChannel>,
    }

    #[async_trait]
    impl MessageBus for StallingBus {
        async fn open_channel(&self, exchange: &str) -> Result<Box<dyn BusChannel>, BusError> {
            Ok(Box::new(StallingChannel {
                _inner: self.inner.open_channel(exchange).await?,
            }))
        }
    }

    #[async_trait]
    impl BusChannel for StallingChannel {
        async fn send(&mut self, _: &Bytes, _: &MessageParameters) -> Result<(), BusError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), BusError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publishes_backlog_in_order() {
        let store = store_with(3).await;
        let tracker = Arc::new(InMemoryTrackerStore::new(EXCHANGE));
        let bus = InMemoryBus::new();
        let publisher = publisher(store, tracker.clone(), Arc::new(bus.clone()), None);

        let outcome = publisher.publish_notifications().await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome {
                published: 3,
                cursor_before: 0,
                cursor_after: 3
            }
        );
        assert_eq!(cursor(&tracker).await, 3);
        assert_eq!(delivered_ids(&bus).await, vec![1, 2, 3]);

        let first = &bus.delivered(EXCHANGE).await[0];
        assert_eq!(first.parameters.type_name, "UserRegistered");
        assert!(first.parameters.durable);
        let body: serde_json::Value = serde_json::from_slice(&first.body).unwrap();
        assert_eq!(body["id"], 1);
        assert_eq!(body["body"]["username"], "user-1");
        assert_eq!(bus.open_channels(), 0);
    }

    #[tokio::test]
    async fn test_empty_backlog_opens_no_channel() {
        let store = store_with(2).await;
        let tracker = Arc::new(InMemoryTrackerStore::starting_at(EXCHANGE, 2));
        let bus = InMemoryBus::new();
        let publisher = publisher(store, tracker.clone(), Arc::new(bus.clone()), None);

        let outcome = publisher.publish_notifications().await.unwrap();
        assert!(outcome.is_idle());
        assert_eq!(outcome.cursor_after, 2);
        assert_eq!(bus.opened_total(), 0);
        assert_eq!(cursor(&tracker).await, 2);
    }

    #[tokio::test]
    async fn test_failed_send_is_redelivered() {
        let store = store_with(5).await;
        let tracker = Arc::new(InMemoryTrackerStore::new(EXCHANGE));
        let bus = InMemoryBus::new();
        let flaky = FlakyBus::failing_send(bus.clone(), 3);
        let publisher = publisher(store, tracker.clone(), Arc::new(flaky), None);

        let err = publisher.publish_notifications().await.unwrap_err();
        assert!(matches!(err, PublishError::Bus(BusError::SendFailed { ref message_id, .. }) if message_id == "3"));
        assert!(err.is_transient());
        assert_eq!(cursor(&tracker).await, 0);
        assert_eq!(bus.open_channels(), 0);

        let outcome = publisher.publish_notifications().await.unwrap();
        assert_eq!(outcome.published, 5);
        assert_eq!(cursor(&tracker).await, 5);
        assert_eq!(delivered_ids(&bus).await, vec![1, 2, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_releases_channel() {
        let store = store_with(2).await;
        let tracker = Arc::new(InMemoryTrackerStore::new(EXCHANGE));
        let bus = InMemoryBus::new();
        let stalling = StallingBus { inner: bus.clone() };
        let publisher = publisher(store, tracker.clone(), Arc::new(stalling), None);

        let err = publisher.publish_notifications().await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Bus(BusError::Timeout { ref message_id, after }) if message_id == "1" && after == Duration::from_secs(5)
        ));
        assert_eq!(cursor(&tracker).await, 0);
        assert_eq!(bus.open_channels(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_cycle_leaves_tracker_and_releases_channel() {
        let store = store_with(2).await;
        let tracker = Arc::new(InMemoryTrackerStore::new(EXCHANGE));
        let bus = InMemoryBus::new();
        let stalling = StallingBus { inner: bus.clone() };
        let publisher = publisher(store, tracker.clone(), Arc::new(stalling), None);

        // Dropped mid-send, well before the 5s send timeout.
        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), publisher.publish_notifications()).await;
        assert!(abandoned.is_err());
        assert_eq!(cursor(&tracker).await, 0);
        assert_eq!(bus.open_channels(), 0);
        assert_eq!(bus.opened_total(), 1);

        // The cycle lock went with it: the next cycle gets as far as the bus.
        let again =
            tokio::time::timeout(Duration::from_secs(1), publisher.publish_notifications()).await;
        assert!(again.is_err());
        assert_eq!(bus.opened_total(), 2);
        assert_eq!(bus.open_channels(), 0);
        assert_eq!(cursor(&tracker).await, 0);
    }

    #[tokio::test]
    async fn test_bounded_batches_advance_per_sub_batch() {
        let store = store_with(5).await;
        let tracker = Arc::new(InMemoryTrackerStore::new(EXCHANGE));
        let bus = InMemoryBus::new();
        let flaky = FlakyBus::failing_send(bus.clone(), 4);
        let publisher = publisher(store, tracker.clone(), Arc::new(flaky), Some(2));

        assert!(publisher.publish_notifications().await.is_err());
        assert_eq!(cursor(&tracker).await, 2);

        let outcome = publisher.publish_notifications().await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome {
                published: 3,
                cursor_before: 2,
                cursor_after: 5
            }
        );
        assert_eq!(delivered_ids(&bus).await, vec![1, 2, 3, 3, 4, 5]);
        assert_eq!(bus.opened_total(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_cycles_are_serialized() {
        let store = store_with(5).await;
        let tracker = Arc::new(InMemoryTrackerStore::new(EXCHANGE));
        let bus = InMemoryBus::new();
        let publisher = Arc::new(publisher(store, tracker.clone(), Arc::new(bus.clone()), None));

        let (a, b) = tokio::join!(
            publisher.publish_notifications(),
            publisher.publish_notifications()
        );
        let published = a.unwrap().published + b.unwrap().published;
        assert_eq!(published, 5);
        assert_eq!(delivered_ids(&bus).await, vec![1, 2, 3, 4, 5]);
        assert_eq!(cursor(&tracker).await, 5);
    }

    #[tokio::test]
    async fn test_competing_publishers_advance_once() {
        let store: Arc<dyn EventStore> = store_with(4).await;
        let tracker = Arc::new(InMemoryTrackerStore::new(EXCHANGE));
        let bus = InMemoryBus::new();
        let first = publisher(store.clone(), tracker.clone(), Arc::new(bus.clone()), None);
        let second = publisher(store, tracker.clone(), Arc::new(bus.clone()), None);

        let (a, b) = tokio::join!(first.publish_notifications(), second.publish_notifications());
        let advanced = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Ok(outcome) if outcome.published == 4))
            .count();
        assert_eq!(advanced, 1);
        for result in [a, b] {
            match result {
                Ok(outcome) => assert!(outcome.published == 4 || outcome.is_idle()),
                Err(e) => assert!(matches!(e, PublishError::TrackerConflict { expected: 0 })),
            }
        }
        assert_eq!(cursor(&tracker).await, 4);
        assert_eq!(bus.open_channels(), 0);
    }

    #[test]
    fn test_integrity_faults_are_not_transient() {
        let permanent = [
            PublishError::Store(StoreError::InvalidRecord("negative event id -1".into())),
            PublishError::Store(StoreError::Discontinuity {
                expected: 3,
                found: 4,
            }),
            PublishError::Tracker(TrackerError::InvalidRecord("negative cursor".into())),
            PublishError::Tracker(TrackerError::Regression {
                current: 5,
                requested: 4,
            }),
            PublishError::UnsupportedOperation,
        ];
        for err in permanent {
            assert!(!err.is_transient(), "{err} should need an operator");
        }

        assert!(PublishError::TrackerConflict { expected: 0 }.is_transient());
        assert!(
            PublishError::Bus(BusError::SendFailed {
                message_id: "1".into(),
                reason: "connection reset".into(),
            })
            .is_transient()
        );
        assert!(PublishError::Store(StoreError::Unavailable(sqlx::Error::PoolTimedOut)).is_transient());
    }

    #[tokio::test]
    async fn test_confirmation() {
        let store = store_with(1).await;
        let tracker = Arc::new(InMemoryTrackerStore::new(EXCHANGE));
        let production = publisher(store, tracker, Arc::new(InMemoryBus::new()), None);
        assert!(matches!(
            production.internal_only_test_confirmation(),
            Err(PublishError::UnsupportedOperation)
        ));

        let confirming = ConfirmingNotificationPublisher::new(production);
        assert!(!confirming.internal_only_test_confirmation().unwrap());
        confirming.publish_notifications().await.unwrap();
        assert!(confirming.internal_only_test_confirmation().unwrap());
        confirming.publish_notifications().await.unwrap();
        assert!(!confirming.internal_only_test_confirmation().unwrap());
    }
}
