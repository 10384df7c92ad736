//! Configuration types for notilog.
//!
//! These types represent the validated runtime configuration used by the server
//! and can be shared across crates. The actual config loading/parsing is handled
//! by the server crate.

mod access;
mod config_store;
mod feed;
mod publisher;
mod server;

pub use access::{AdminConfig, ProducerConfig};
pub use config_store::{ConfigStore, ConfigWatcher};
pub use feed::{DEFAULT_ARCHIVED_MAX_AGE, DEFAULT_CURRENT_MAX_AGE, DEFAULT_PAGE_SIZE, FeedConfig};
pub use publisher::{BusConfig, PublisherConfig};
pub use server::ServerConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration state with separate locks for each section.
///
/// The publisher section lives in its own [`ConfigStore`] so the scheduler
/// can watch it for reloads.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub admin: Arc<RwLock<AdminConfig>>,
    pub producer: Arc<RwLock<ProducerConfig>>,
    pub feed: Arc<RwLock<FeedConfig>>,
    pub publisher: ConfigStore<PublisherConfig>,
}

impl SharedConfig {
    pub fn new(
        server: ServerConfig,
        admin: AdminConfig,
        producer: ProducerConfig,
        feed: FeedConfig,
        publisher: PublisherConfig,
    ) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            admin: Arc::new(RwLock::new(admin)),
            producer: Arc::new(RwLock::new(producer)),
            feed: Arc::new(RwLock::new(feed)),
            publisher: ConfigStore::new(publisher),
        }
    }
}
