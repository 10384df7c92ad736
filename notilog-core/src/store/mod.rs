//! The event store: an append-only, strictly ordered ledger of events.
//!
//! Ids are assigned by the store at append time. They start at 1, are
//! strictly increasing and gapless, so `count_stored_events()` is also the
//! highest assigned id. Everything downstream (publisher, feed) relies on
//! this: "what happened before what" is decided by the id alone.

mod memory;
mod postgres;

pub use memory::InMemoryEventStore;
pub use postgres::PgEventStore;

use async_trait::async_trait;
use bytes::Bytes;
use compact_str::CompactString;
use thiserror::Error;

use crate::notification::{CodecError, DomainEvent};

/// An event as recorded by the store. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub event_id: u64,
    pub type_name: CompactString,
    pub payload: Bytes,
    pub occurred_on: time::OffsetDateTime,
}

/// An event waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub type_name: CompactString,
    pub payload: Bytes,
    pub occurred_on: time::OffsetDateTime,
}

impl NewEvent {
    pub fn new(
        type_name: impl Into<CompactString>,
        payload: impl Into<Bytes>,
        occurred_on: time::OffsetDateTime,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            payload: payload.into(),
            occurred_on,
        }
    }

    /// Serialize a domain event as a JSON payload tagged with its type name.
    pub fn from_domain_event<E: DomainEvent>(event: &E) -> Result<Self, CodecError> {
        let payload = serde_json::to_vec(event)?;
        Ok(Self::new(E::TYPE_NAME, payload, event.occurred_on()))
    }
}

/// Errors that can occur while reading or writing the event store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database could not be reached or failed the statement.
    #[error("event store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// A row could not be turned into a [`StoredEvent`].
    #[error("invalid stored event record: {0}")]
    InvalidRecord(String),

    /// A read returned ids out of order or with a hole.
    #[error("stored events are not contiguous: expected id {expected}, found {found}")]
    Discontinuity { expected: u64, found: u64 },
}

/// Store query interface consumed by the publisher and the feed.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event, assigning the next id. Durable before returning.
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, StoreError>;

    /// All events with `event_id > id`, ascending.
    async fn all_stored_events_since(&self, id: u64) -> Result<Vec<StoredEvent>, StoreError>;

    /// All events with `low <= event_id <= high`, ascending.
    async fn all_stored_events_between(
        &self,
        low: u64,
        high: u64,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// The highest assigned id, 0 if the store is empty.
    async fn count_stored_events(&self) -> Result<u64, StoreError>;
}

/// Check that `events` carry exactly the ids `first, first + 1, ...`.
pub fn ensure_contiguous(events: &[StoredEvent], first: u64) -> Result<(), StoreError> {
    for (expected, event) in (first..).zip(events) {
        if event.event_id != expected {
            return Err(StoreError::Discontinuity {
                expected,
                found: event.event_id,
            });
        }
    }
    Ok(())
}
