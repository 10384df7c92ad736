//! Configuration module for notilog-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;
pub mod runtime;

use crate::config::file::{BusKind, FileConfig};
use crate::config::runtime::{
    AdminConfig, BusConfig, FeedConfig, ProducerConfig, PublisherConfig, ServerConfig,
    SharedConfig,
};
use notilog_core::bus::WebhookSubscriber;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub producer: ProducerConfig,
    pub feed: FeedConfig,
    pub publisher: PublisherConfig,
    pub bus: BusConfig,
}

impl LoadedConfig {
    /// Convert into a SharedConfig. The bus section is only read at startup.
    pub fn into_shared(self) -> (SharedConfig, BusConfig) {
        (
            SharedConfig::new(
                self.server,
                self.admin,
                self.producer,
                self.feed,
                self.publisher,
            ),
            self.bus,
        )
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        // Applied after the rewrite so the override never lands in the file.
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        Ok(build_loaded_config(file_config, secret_hash))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.admin.secret.is_empty() {
        return invalid("admin.secret must not be empty");
    }
    if config.producer.secret.is_empty() {
        return invalid("producer.secret must not be empty");
    }
    if config.feed.page_size == 0 {
        return invalid("feed.page_size must be greater than 0");
    }
    if config.publisher.exchange.trim().is_empty() {
        return invalid("publisher.exchange must not be empty");
    }
    if config.publisher.interval_ms == 0 || config.publisher.send_timeout_ms == 0 {
        return invalid("publisher.interval_ms and publisher.send_timeout_ms must be greater than 0");
    }
    if config.publisher.max_batch_size == Some(0) {
        return invalid("publisher.max_batch_size must be greater than 0 when set");
    }
    if config.bus.kind == BusKind::Webhook {
        let exchange = &config.publisher.exchange;
        if !config.bus.subscribers.iter().any(|s| &s.exchange == exchange) {
            tracing::warn!(%exchange, "No webhook subscriber is bound to the publisher exchange");
        }
        for subscriber in &config.bus.subscribers {
            if !matches!(subscriber.url.scheme(), "http" | "https") {
                return Err(ConfigError::ValidationError(format!(
                    "subscriber url {} must be http or https",
                    subscriber.url
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{Argon2, PasswordHasher, password_hash::SaltString};

    let salt_bytes: [u8; 16] = rand::random();
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| ConfigError::HashError(e.to_string()))?;

    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

fn build_loaded_config(file_config: FileConfig, secret_hash: String) -> LoadedConfig {
    let publisher = file_config.publisher;
    let bus = match file_config.bus.kind {
        BusKind::Memory => BusConfig::Memory,
        BusKind::Webhook => BusConfig::Webhook {
            subscribers: file_config
                .bus
                .subscribers
                .into_iter()
                .map(|s| WebhookSubscriber {
                    exchange: s.exchange.into(),
                    url: s.url,
                    secret: s.secret.into_bytes().into_boxed_slice(),
                })
                .collect(),
        },
    };

    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        admin: AdminConfig::new(secret_hash),
        producer: ProducerConfig::new(file_config.producer.secret.into_bytes()),
        feed: FeedConfig {
            page_size: file_config.feed.page_size,
            current_max_age: Duration::from_secs(file_config.feed.current_max_age_secs),
            archived_max_age: Duration::from_secs(file_config.feed.archived_max_age_secs),
        },
        publisher: PublisherConfig {
            enabled: publisher.enabled,
            exchange: publisher.exchange.trim().into(),
            interval: Duration::from_millis(publisher.interval_ms),
            send_timeout: Duration::from_millis(publisher.send_timeout_ms),
            max_batch_size: publisher.max_batch_size,
            max_conflict_retries: publisher.max_conflict_retries,
        },
        bus,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[server]
listen = "127.0.0.1:3000"

[admin]
secret = "plain-admin-secret"

[producer]
secret = "producer-secret"

[publisher]
exchange = "agilepm"
send_timeout_ms = 1500

[bus]
kind = "webhook"

[[bus.subscribers]]
exchange = "agilepm"
url = "https://consumer.example.com/hook"
secret = "subscriber-secret"
"#;

    fn temp_config(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "notilog-{}-{}.toml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_hashes_plaintext_secret() {
        let path = temp_config("hash", CONFIG);
        let loader = ConfigLoader::new(&path, Some("127.0.0.1:4000".parse().unwrap()));

        let loaded = loader.load().unwrap();
        assert!(loaded.admin.verify_secret("plain-admin-secret"));
        assert_eq!(loaded.server.listen.port(), 4000);
        assert_eq!(loaded.producer.secret_bytes(), b"producer-secret");
        assert_eq!(loaded.publisher.exchange, "agilepm");
        assert_eq!(loaded.publisher.send_timeout, Duration::from_millis(1500));
        match &loaded.bus {
            BusConfig::Webhook { subscribers } => {
                assert_eq!(subscribers.len(), 1);
                assert_eq!(&*subscribers[0].secret, b"subscriber-secret");
            }
            other => panic!("unexpected bus config {other:?}"),
        }

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("$argon2"));
        assert!(!rewritten.contains("plain-admin-secret"));
        assert!(rewritten.contains("127.0.0.1:3000"));

        // A second load keeps the existing hash.
        let reloaded = loader.reload().unwrap();
        assert_eq!(reloaded.admin.secret_hash, loaded.admin.secret_hash);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        for (name, patch) in [
            ("page", "[feed]\npage_size = 0\n"),
            ("batch", "[publisher]\nmax_batch_size = 0\n"),
            ("exchange", "[publisher]\nexchange = \" \"\n"),
        ] {
            let content = format!(
                "[admin]\nsecret = \"$argon2id$v=19$m=19456,t=2,p=1$abc123\"\n\n[producer]\nsecret = \"p\"\n\n{patch}"
            );
            let path = temp_config(name, &content);
            let result = ConfigLoader::new(&path, None).load();
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "{name} should fail validation"
            );
            std::fs::remove_file(&path).unwrap();
        }
    }
}
