//! TOML file configuration structures.
//!
//! These structs directly map to the `notilog.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub producer: ProducerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Producer configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// HMAC key producers sign `POST /events` bodies with.
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_current_max_age_secs")]
    pub current_max_age_secs: u64,
    #[serde(default = "default_archived_max_age_secs")]
    pub archived_max_age_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            current_max_age_secs: default_current_max_age_secs(),
            archived_max_age_secs: default_archived_max_age_secs(),
        }
    }
}

fn default_page_size() -> u64 {
    notilog_core::config::DEFAULT_PAGE_SIZE
}

fn default_current_max_age_secs() -> u64 {
    notilog_core::config::DEFAULT_CURRENT_MAX_AGE.as_secs()
}

fn default_archived_max_age_secs() -> u64 {
    notilog_core::config::DEFAULT_ARCHIVED_MAX_AGE.as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Unset publishes the whole backlog as one batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<u64>,
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exchange: default_exchange(),
            interval_ms: default_interval_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            max_batch_size: None,
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_exchange() -> String {
    "notilog".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

fn default_max_conflict_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    #[default]
    Memory,
    Webhook,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub kind: BusKind,
    #[serde(default)]
    pub subscribers: Vec<SubscriberConfig>,
}

/// A webhook endpoint receiving pushes for one exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    pub exchange: String,
    pub url: Url,
    /// HMAC key the pushed bodies are signed with.
    pub secret: String,
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}
