//! The published-notification tracker: the publisher's durable cursor.
//!
//! The tracker holds the id of the most recently pushed notification for
//! one exchange. It only moves forward, and only through
//! [`compare_and_advance`](PublishedNotificationTrackerStore::compare_and_advance),
//! so two publishers racing on the same exchange cannot both advance over
//! the same range.

mod memory;
mod postgres;

pub use memory::InMemoryTrackerStore;
pub use postgres::PgTrackerStore;

use async_trait::async_trait;
use compact_str::CompactString;
use thiserror::Error;

/// Snapshot of the tracker for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedNotificationTracker {
    pub exchange_name: CompactString,
    pub most_recent_published_notification_id: u64,
}

/// Errors that can occur while reading or advancing the tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("invalid tracker record: {0}")]
    InvalidRecord(String),

    /// An advance would move the cursor backwards.
    #[error("tracker cannot move back from {current} to {requested}")]
    Regression { current: u64, requested: u64 },
}

/// Tracker persistence interface, owned by the publisher.
#[async_trait]
pub trait PublishedNotificationTrackerStore: Send + Sync {
    fn exchange_name(&self) -> &str;

    /// Current cursor; a tracker that was never advanced reads as 0.
    async fn read(&self) -> Result<PublishedNotificationTracker, TrackerError>;

    /// Set the cursor to `new_value` if it still equals `expected`.
    ///
    /// Returns `Ok(false)` when another writer moved it first.
    async fn compare_and_advance(&self, expected: u64, new_value: u64) -> Result<bool, TrackerError>;
}

pub(crate) fn check_forward(expected: u64, new_value: u64) -> Result<(), TrackerError> {
    if new_value < expected {
        return Err(TrackerError::Regression {
            current: expected,
            requested: new_value,
        });
    }
    Ok(())
}
