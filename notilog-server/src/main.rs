//! notilog server
//!
//! Stores domain events, pushes them to a message bus exchange and serves
//! them as a paged notification feed.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::{Parser, ValueEnum};
use config::runtime::BusConfig;
use config::{ConfigLoader, get_database_url};
use notilog_core::bus::{InMemoryBus, MessageBus, WebhookBus};
use notilog_core::events::publish_tick_channel;
use notilog_core::notification::{EventTypeRegistry, NotificationSerializer};
use notilog_core::processors::{BusNotificationPublisher, PublishScheduler, PublisherSettings};
use notilog_core::store::{EventStore, PgEventStore};
use notilog_core::tracker::{PgTrackerStore, PublishedNotificationTrackerStore};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// notilog - reliable event notification feed and publisher
#[derive(Parser, Debug)]
#[command(name = "notilog-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./notilog.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "NOTILOG_LOG_FORMAT")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_format);

    tracing::info!("Starting notilog-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Convert to shared config with separate locks for each section
    let (shared_config, bus_config) = loaded_config.into_shared();
    let publisher_config = shared_config.publisher.read();

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Storage
    let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(db_pool.clone()));
    let tracker: Arc<dyn PublishedNotificationTrackerStore> = Arc::new(PgTrackerStore::new(
        db_pool.clone(),
        publisher_config.exchange.clone(),
    ));

    // Message bus
    let (bus, webhook_bus): (Arc<dyn MessageBus>, Option<WebhookBus>) = match bus_config {
        BusConfig::Memory => {
            tracing::warn!("Using the in-memory bus, published messages stay in this process");
            (Arc::new(InMemoryBus::new()), None)
        }
        BusConfig::Webhook { subscribers } => {
            tracing::info!(count = subscribers.len(), "Using the webhook bus");
            let bus = WebhookBus::new(subscribers);
            (Arc::new(bus.clone()), Some(bus))
        }
    };

    // Publisher and its scheduler
    let serializer = NotificationSerializer::new(Arc::new(EventTypeRegistry::new()));
    let publisher = Arc::new(BusNotificationPublisher::new(
        store.clone(),
        tracker.clone(),
        bus,
        serializer.clone(),
        PublisherSettings::from(&*publisher_config),
    ));
    let scheduler = PublishScheduler::new(publisher, shared_config.publisher.clone());
    let publisher_status = scheduler.status();
    let (publish_ticks, tick_rx) = publish_tick_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(
        shutdown_rx,
        tick_rx,
        shared_config.publisher.subscribe(),
    ));

    // Create application state
    let state = AppState {
        config: shared_config,
        store,
        tracker,
        serializer,
        publish_ticks,
        publisher_status,
    };

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader, webhook_bus);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop background tasks; the scheduler finishes its current cycle first
    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        tracing::error!("PublishScheduler task failed: {}", e);
    }

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
