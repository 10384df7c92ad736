use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{EventStore, NewEvent, StoreError, StoredEvent};

/// An event store held in process memory.
///
/// The event with id `n` lives at index `n - 1`. Appends take the write
/// lock, so ids stay gapless under concurrent callers and every read sees
/// a consistent prefix of the log.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<StoredEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, StoreError> {
        let mut events = self.events.write().await;
        let stored = StoredEvent {
            event_id: events.len() as u64 + 1,
            type_name: event.type_name,
            payload: event.payload,
            occurred_on: event.occurred_on,
        };
        events.push(stored.clone());
        debug!(event_id = stored.event_id, type_name = %stored.type_name, "Appended event");
        Ok(stored)
    }

    async fn all_stored_events_since(&self, id: u64) -> Result<Vec<StoredEvent>, StoreError> {
        let events = self.events.read().await;
        let start = usize::try_from(id).unwrap_or(usize::MAX).min(events.len());
        Ok(events[start..].to_vec())
    }

    async fn all_stored_events_between(
        &self,
        low: u64,
        high: u64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let events = self.events.read().await;
        let len = events.len();
        let start = usize::try_from(low.max(1) - 1).unwrap_or(usize::MAX).min(len);
        let end = usize::try_from(high).unwrap_or(usize::MAX).min(len);
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(events[start..end].to_vec())
    }

    async fn count_stored_events(&self) -> Result<u64, StoreError> {
        Ok(self.events.read().await.len() as u64)
    }
}
