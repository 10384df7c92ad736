use sqlx::PgPool;

/// Runs kanau processors against the connection pool.
///
/// Every `Processor<Query> for DatabaseProcessor` impl in
/// [`crate::entities`] is one SQL statement (or one short transaction).
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
