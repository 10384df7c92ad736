//! Event processors.
//!
//! - `NotificationPublisher`: pushes unpublished notifications to the bus
//! - `PublishScheduler`: Receives `PublishTick`, drives publish cycles

pub mod publish_scheduler;
pub mod publisher;

pub use publish_scheduler::{PublishScheduler, PublisherStatus};
pub use publisher::{
    BusNotificationPublisher, ConfirmingNotificationPublisher, NotificationPublisher,
    PublishError, PublishOutcome, PublisherSettings,
};
