//! Application state shared across all request handlers.

use notilog_core::config::SharedConfig;
use notilog_core::events::PublishTickSender;
use notilog_core::notification::NotificationSerializer;
use notilog_core::processors::PublisherStatus;
use notilog_core::store::EventStore;
use notilog_core::tracker::PublishedNotificationTrackerStore;
use std::sync::Arc;
use tokio::sync::watch;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration (sections can be reloaded via SIGHUP).
    pub config: SharedConfig,
    pub store: Arc<dyn EventStore>,
    pub tracker: Arc<dyn PublishedNotificationTrackerStore>,
    pub serializer: NotificationSerializer,
    /// Nudges the publish scheduler.
    pub publish_ticks: PublishTickSender,
    pub publisher_status: watch::Receiver<PublisherStatus>,
}
