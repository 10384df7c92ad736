use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;

use super::{EventStore, NewEvent, StoreError, StoredEvent};
use crate::entities::stored_event::{
    AppendStoredEvent, GetMaxStoredEventId, GetStoredEventsBetween, GetStoredEventsSince,
    StoredEventRow,
};
use crate::framework::DatabaseProcessor;

/// Event store backed by the `stored_events` table.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    db: DatabaseProcessor,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor::new(pool),
        }
    }
}

fn into_events(rows: Vec<StoredEventRow>) -> Result<Vec<StoredEvent>, StoreError> {
    rows.into_iter().map(StoredEvent::try_from).collect()
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, StoreError> {
        let row = self
            .db
            .process(AppendStoredEvent {
                type_name: event.type_name.into_string(),
                payload: event.payload.to_vec(),
                occurred_on: event.occurred_on,
            })
            .await?;
        StoredEvent::try_from(row)
    }

    async fn all_stored_events_since(&self, id: u64) -> Result<Vec<StoredEvent>, StoreError> {
        into_events(self.db.process(GetStoredEventsSince { after: id }).await?)
    }

    async fn all_stored_events_between(
        &self,
        low: u64,
        high: u64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        if low > high {
            return Ok(Vec::new());
        }
        into_events(self.db.process(GetStoredEventsBetween { low, high }).await?)
    }

    async fn count_stored_events(&self) -> Result<u64, StoreError> {
        let max = self.db.process(GetMaxStoredEventId).await?;
        u64::try_from(max).map_err(|_| StoreError::InvalidRecord(format!("negative max id {max}")))
    }
}
