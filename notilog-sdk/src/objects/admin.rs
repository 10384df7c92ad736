//! Admin API response types.

use serde::{Deserialize, Serialize};

/// Result of the last publish cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcomeResponse {
    pub published: u64,
    pub cursor_before: u64,
    pub cursor_after: u64,
}

/// `GET /admin/publisher` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherStatusResponse {
    pub exchange: String,
    /// Id of the most recently published notification.
    pub tracker: u64,
    /// Highest id assigned by the event store.
    pub high_water_mark: u64,
    /// `high_water_mark - tracker`.
    pub pending: u64,
    pub running: bool,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<PublishOutcomeResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<time::OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_attempt_at: Option<time::OffsetDateTime>,
}
