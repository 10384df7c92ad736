//! Notifications: stored events wrapped for external consumption.
//!
//! A [`Notification`] is derived from a [`StoredEvent`] on demand and has
//! no identity of its own; its id is the store id. The payload stays opaque
//! bytes until an [`EventTypeRegistry`] decodes it for a representation.

mod registry;
mod serializer;

pub use registry::EventTypeRegistry;
pub use serializer::NotificationSerializer;

use bytes::Bytes;
use compact_str::CompactString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::store::StoredEvent;

/// A domain event raised by an external aggregate.
///
/// Implementors are stored as JSON tagged with [`TYPE_NAME`](Self::TYPE_NAME).
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn occurred_on(&self) -> time::OffsetDateTime;
}

/// Errors raised while encoding or decoding notification payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload of {type_name} could not be decoded: {reason}")]
    Decode {
        type_name: CompactString,
        reason: String,
    },
}

/// An immutable notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub notification_id: u64,
    pub type_name: CompactString,
    pub occurred_on: time::OffsetDateTime,
    pub body: Bytes,
}

impl From<StoredEvent> for Notification {
    fn from(event: StoredEvent) -> Self {
        Self {
            notification_id: event.event_id,
            type_name: event.type_name,
            occurred_on: event.occurred_on,
            body: event.payload,
        }
    }
}

impl Notification {
    /// Translate a batch of stored events, keeping their order.
    pub fn from_stored_events(events: Vec<StoredEvent>) -> Vec<Notification> {
        events.into_iter().map(Notification::from).collect()
    }

    /// Decode the body into a concrete domain event.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, CodecError> {
        if self.type_name != E::TYPE_NAME {
            return Err(CodecError::Decode {
                type_name: self.type_name.clone(),
                reason: format!("expected {}", E::TYPE_NAME),
            });
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}
