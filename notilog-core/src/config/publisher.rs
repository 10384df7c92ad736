//! Publisher and scheduler configuration.

use std::time::Duration;

use compact_str::CompactString;

use crate::bus::WebhookSubscriber;

/// Settings for the publish cycle and the scheduler driving it.
///
/// `exchange`, `send_timeout` and `max_batch_size` are fixed when the
/// publisher is built. `interval` and `max_conflict_retries` are read by
/// the scheduler on every cycle and follow config reloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub enabled: bool,
    pub exchange: CompactString,
    pub interval: Duration,
    pub send_timeout: Duration,
    /// `None` publishes the whole backlog as one batch.
    pub max_batch_size: Option<u64>,
    pub max_conflict_retries: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exchange: CompactString::const_new("notilog"),
            interval: Duration::from_secs(1),
            send_timeout: Duration::from_secs(10),
            max_batch_size: None,
            max_conflict_retries: 3,
        }
    }
}

/// Which bus the publisher pushes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusConfig {
    /// In-process fan-out, for development and tests.
    Memory,
    /// HTTP POST to every subscriber of the exchange.
    Webhook { subscribers: Vec<WebhookSubscriber> },
}
