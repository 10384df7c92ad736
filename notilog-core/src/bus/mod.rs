//! Message bus interface consumed by the publisher.
//!
//! A bus offers named fan-out exchanges. The publisher opens one
//! [`BusChannel`] per publish cycle, sends every notification of the batch
//! through it in order, and closes it on every exit path.

mod memory;
mod webhook;

pub use memory::{DEFAULT_RETENTION, DeliveredMessage, InMemoryBus};
pub use webhook::{WebhookBus, WebhookSubscriber};

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use compact_str::CompactString;
use thiserror::Error;

/// Metadata attached to every pushed message.
///
/// Mirrors the per-notification fields of the feed: type name, id as a
/// decimal string, and occurrence time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageParameters {
    pub type_name: CompactString,
    pub message_id: String,
    pub timestamp: time::OffsetDateTime,
    pub durable: bool,
}

impl MessageParameters {
    pub fn durable(
        type_name: CompactString,
        message_id: String,
        timestamp: time::OffsetDateTime,
    ) -> Self {
        Self {
            type_name,
            message_id,
            timestamp,
            durable: true,
        }
    }
}

/// Errors that can occur while talking to the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The exchange could not be opened.
    #[error("message bus unavailable: {0}")]
    Unavailable(String),

    /// A single message was not accepted.
    #[error("failed to send message {message_id}: {reason}")]
    SendFailed { message_id: String, reason: String },

    /// A send did not complete within the configured timeout.
    #[error("sending message {message_id} timed out after {after:?}")]
    Timeout { message_id: String, after: Duration },

    /// The channel was already closed.
    #[error("channel is closed")]
    Closed,
}

/// A bus that can open channels to fan-out exchanges.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Open a channel to `exchange`, creating the exchange if it is absent.
    async fn open_channel(&self, exchange: &str) -> Result<Box<dyn BusChannel>, BusError>;
}

/// A channel used for exactly one publish cycle.
#[async_trait]
pub trait BusChannel: Send {
    /// Send one durable message; returns once the bus has accepted it.
    async fn send(&mut self, body: &Bytes, parameters: &MessageParameters) -> Result<(), BusError>;

    /// Release the channel. Sends after `close` fail with [`BusError::Closed`].
    async fn close(&mut self) -> Result<(), BusError>;
}
