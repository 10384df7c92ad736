use async_trait::async_trait;
use compact_str::CompactString;
use tokio::sync::Mutex;

use super::{
    PublishedNotificationTracker, PublishedNotificationTrackerStore, TrackerError, check_forward,
};

/// Tracker kept in process memory.
#[derive(Debug)]
pub struct InMemoryTrackerStore {
    exchange_name: CompactString,
    value: Mutex<u64>,
}

impl InMemoryTrackerStore {
    pub fn new(exchange_name: impl Into<CompactString>) -> Self {
        Self::starting_at(exchange_name, 0)
    }

    pub fn starting_at(exchange_name: impl Into<CompactString>, value: u64) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            value: Mutex::new(value),
        }
    }
}

#[async_trait]
impl PublishedNotificationTrackerStore for InMemoryTrackerStore {
    fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    async fn read(&self) -> Result<PublishedNotificationTracker, TrackerError> {
        Ok(PublishedNotificationTracker {
            exchange_name: self.exchange_name.clone(),
            most_recent_published_notification_id: *self.value.lock().await,
        })
    }

    async fn compare_and_advance(&self, expected: u64, new_value: u64) -> Result<bool, TrackerError> {
        check_forward(expected, new_value)?;
        let mut value = self.value.lock().await;
        if *value != expected {
            return Ok(false);
        }
        *value = new_value;
        Ok(true)
    }
}
