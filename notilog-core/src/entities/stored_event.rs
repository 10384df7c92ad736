use crate::framework::DatabaseProcessor;
use crate::store::{StoreError, StoredEvent};
use kanau::processor::Processor;

/// A row of the `stored_events` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredEventRow {
    pub event_id: i64,
    pub type_name: String,
    pub payload: Vec<u8>,
    pub occurred_on: time::OffsetDateTime,
}

impl TryFrom<StoredEventRow> for StoredEvent {
    type Error = StoreError;

    fn try_from(row: StoredEventRow) -> Result<Self, StoreError> {
        let event_id = u64::try_from(row.event_id)
            .map_err(|_| StoreError::InvalidRecord(format!("negative event id {}", row.event_id)))?;
        Ok(StoredEvent {
            event_id,
            type_name: row.type_name.into(),
            payload: row.payload.into(),
            occurred_on: row.occurred_on,
        })
    }
}

/// Convert a database id bound to `i64`. Values above `i64::MAX` cannot
/// exist in the table, so they are clamped.
pub(crate) fn to_db_id(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
/// Append an event, assigning `MAX(event_id) + 1`.
///
/// The table lock is held until commit, so concurrent appenders queue up
/// and the sequence stays gapless even when a transaction aborts. Plain
/// readers are not blocked.
pub struct AppendStoredEvent {
    pub type_name: String,
    pub payload: Vec<u8>,
    pub occurred_on: time::OffsetDateTime,
}

impl Processor<AppendStoredEvent> for DatabaseProcessor {
    type Output = StoredEventRow;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:AppendStoredEvent")]
    async fn process(&self, insert: AppendStoredEvent) -> Result<StoredEventRow, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("LOCK TABLE stored_events IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, StoredEventRow>(
            r#"
            INSERT INTO stored_events (event_id, type_name, payload, occurred_on)
            SELECT COALESCE(MAX(event_id), 0) + 1, $1, $2, $3
            FROM stored_events
            RETURNING event_id, type_name, payload, occurred_on
            "#,
        )
        .bind(insert.type_name)
        .bind(insert.payload)
        .bind(insert.occurred_on)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }
}

#[derive(Debug, Clone)]
/// Get every event after `after`, ascending.
pub struct GetStoredEventsSince {
    pub after: u64,
}

impl Processor<GetStoredEventsSince> for DatabaseProcessor {
    type Output = Vec<StoredEventRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetStoredEventsSince")]
    async fn process(&self, query: GetStoredEventsSince) -> Result<Vec<StoredEventRow>, sqlx::Error> {
        sqlx::query_as::<_, StoredEventRow>(
            r#"
            SELECT event_id, type_name, payload, occurred_on
            FROM stored_events
            WHERE event_id > $1
            ORDER BY event_id ASC
            "#,
        )
        .bind(to_db_id(query.after))
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Get the events in the inclusive id range `[low, high]`, ascending.
pub struct GetStoredEventsBetween {
    pub low: u64,
    pub high: u64,
}

impl Processor<GetStoredEventsBetween> for DatabaseProcessor {
    type Output = Vec<StoredEventRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetStoredEventsBetween")]
    async fn process(
        &self,
        query: GetStoredEventsBetween,
    ) -> Result<Vec<StoredEventRow>, sqlx::Error> {
        sqlx::query_as::<_, StoredEventRow>(
            r#"
            SELECT event_id, type_name, payload, occurred_on
            FROM stored_events
            WHERE event_id BETWEEN $1 AND $2
            ORDER BY event_id ASC
            "#,
        )
        .bind(to_db_id(query.low))
        .bind(to_db_id(query.high))
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone, Copy)]
/// Get the highest assigned event id, 0 for an empty table.
pub struct GetMaxStoredEventId;

impl Processor<GetMaxStoredEventId> for DatabaseProcessor {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetMaxStoredEventId")]
    async fn process(&self, _query: GetMaxStoredEventId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(event_id), 0) FROM stored_events")
            .fetch_one(&self.pool)
            .await
    }
}
