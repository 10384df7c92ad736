use async_trait::async_trait;
use compact_str::CompactString;
use kanau::processor::Processor;
use sqlx::PgPool;

use super::{
    PublishedNotificationTracker, PublishedNotificationTrackerStore, TrackerError, check_forward,
};
use crate::entities::published_tracker::{AdvancePublishedTracker, GetOrCreatePublishedTracker};
use crate::framework::DatabaseProcessor;

/// Tracker backed by the `published_notification_trackers` table.
///
/// The row is keyed by exchange name, so several publishers for different
/// exchanges can share one database. The advance is a conditional UPDATE,
/// which makes it safe across processes.
#[derive(Debug, Clone)]
pub struct PgTrackerStore {
    db: DatabaseProcessor,
    exchange_name: CompactString,
}

impl PgTrackerStore {
    pub fn new(pool: PgPool, exchange_name: impl Into<CompactString>) -> Self {
        Self {
            db: DatabaseProcessor::new(pool),
            exchange_name: exchange_name.into(),
        }
    }
}

#[async_trait]
impl PublishedNotificationTrackerStore for PgTrackerStore {
    fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    async fn read(&self) -> Result<PublishedNotificationTracker, TrackerError> {
        let row = self
            .db
            .process(GetOrCreatePublishedTracker {
                exchange_name: self.exchange_name.to_string(),
            })
            .await?;
        let value = u64::try_from(row.most_recent_published_notification_id).map_err(|_| {
            TrackerError::InvalidRecord(format!(
                "negative tracker value {}",
                row.most_recent_published_notification_id
            ))
        })?;
        Ok(PublishedNotificationTracker {
            exchange_name: self.exchange_name.clone(),
            most_recent_published_notification_id: value,
        })
    }

    async fn compare_and_advance(&self, expected: u64, new_value: u64) -> Result<bool, TrackerError> {
        check_forward(expected, new_value)?;
        let advanced = self
            .db
            .process(AdvancePublishedTracker {
                exchange_name: self.exchange_name.to_string(),
                expected,
                new_value,
            })
            .await?;
        Ok(advanced)
    }
}
