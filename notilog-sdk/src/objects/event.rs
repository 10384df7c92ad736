//! Event ingestion request and response types.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::signature::Signature;

/// `POST /events` body, signed with the producer secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendEventRequest {
    pub type_name: CompactString,
    /// Defaults to the time the server receives the request.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub occurred_on: Option<time::OffsetDateTime>,
    /// The serialized domain event.
    pub payload: serde_json::Value,
}

impl Signature for AppendEventRequest {}

/// Response for an appended event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEventResponse {
    pub event_id: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_on: time::OffsetDateTime,
}
