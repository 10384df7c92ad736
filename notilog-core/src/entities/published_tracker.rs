use crate::entities::stored_event::to_db_id;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// A row of the `published_notification_trackers` table, one per exchange.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PublishedTrackerRow {
    pub exchange_name: String,
    pub most_recent_published_notification_id: i64,
    pub updated_at: time::OffsetDateTime,
}

#[derive(Debug, Clone)]
/// Read the tracker row for an exchange, creating it at 0 if absent.
pub struct GetOrCreatePublishedTracker {
    pub exchange_name: String,
}

impl Processor<GetOrCreatePublishedTracker> for DatabaseProcessor {
    type Output = PublishedTrackerRow;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrCreatePublishedTracker")]
    async fn process(
        &self,
        query: GetOrCreatePublishedTracker,
    ) -> Result<PublishedTrackerRow, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO published_notification_trackers (exchange_name)
            VALUES ($1)
            ON CONFLICT (exchange_name) DO NOTHING
            "#,
        )
        .bind(&query.exchange_name)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, PublishedTrackerRow>(
            r#"
            SELECT exchange_name, most_recent_published_notification_id, updated_at
            FROM published_notification_trackers
            WHERE exchange_name = $1
            "#,
        )
        .bind(&query.exchange_name)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Move the tracker from `expected` to `new_value`.
///
/// Only applies if the stored value still equals `expected`; returns
/// whether the row was updated.
pub struct AdvancePublishedTracker {
    pub exchange_name: String,
    pub expected: u64,
    pub new_value: u64,
}

impl Processor<AdvancePublishedTracker> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:AdvancePublishedTracker")]
    async fn process(&self, advance: AdvancePublishedTracker) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE published_notification_trackers
            SET most_recent_published_notification_id = $3, updated_at = now()
            WHERE exchange_name = $1 AND most_recent_published_notification_id = $2
            "#,
        )
        .bind(&advance.exchange_name)
        .bind(to_db_id(advance.expected))
        .bind(to_db_id(advance.new_value))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
