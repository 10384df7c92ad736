//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::config::runtime::{BusConfig, PublisherConfig};
use crate::state::AppState;
use notilog_core::bus::WebhookBus;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C). If the SIGTERM handler cannot be
/// installed, only Ctrl+C is watched.
pub async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler, watching Ctrl+C only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received SIGINT, initiating graceful shutdown");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Access secrets, feed settings and the scheduler knobs of the publisher
/// section apply right away. The webhook subscriber list is swapped on
/// `webhook_bus` when one is running; every other bus change needs a restart.
///
/// Returns a Notify that stops the task.
pub fn spawn_config_reload_handler(
    state: AppState,
    config_loader: Arc<ConfigLoader>,
    webhook_bus: Option<WebhookBus>,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, config reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            *state.config.server.write().await = loaded_config.server;
                            *state.config.admin.write().await = loaded_config.admin;
                            *state.config.producer.write().await = loaded_config.producer;
                            *state.config.feed.write().await = loaded_config.feed;

                            warn_on_fixed_publisher_changes(
                                &state.config.publisher.read(),
                                &loaded_config.publisher,
                            );
                            state.config.publisher.update(loaded_config.publisher);

                            match (&webhook_bus, loaded_config.bus) {
                                (Some(bus), BusConfig::Webhook { subscribers }) => {
                                    tracing::info!(count = subscribers.len(), "Webhook subscribers replaced");
                                    bus.replace_subscribers(subscribers).await;
                                }
                                (None, BusConfig::Memory) => {}
                                _ => {
                                    tracing::warn!("Bus kind changed, restart required to apply it");
                                }
                            }

                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}

/// The publisher is built once; only the scheduler knobs follow a reload.
fn warn_on_fixed_publisher_changes(current: &PublisherConfig, reloaded: &PublisherConfig) {
    if current.exchange != reloaded.exchange {
        tracing::warn!(
            current = %current.exchange,
            reloaded = %reloaded.exchange,
            "publisher.exchange changed, restart required to apply it"
        );
    }
    if current.send_timeout != reloaded.send_timeout
        || current.max_batch_size != reloaded.max_batch_size
    {
        tracing::warn!("publisher send_timeout/max_batch_size changed, restart required to apply them");
    }
}
