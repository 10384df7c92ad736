//! Axum server setup and router configuration.

use crate::api;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{
    Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoints
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        // Feed, ingestion and admin API
        .nest("/api/v1", api::router())
        // Add state to all routes
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Ready check response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    event_store: &'static str,
    high_water_mark: Option<u64>,
}

/// Ready check - the event store answers a count query.
async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.count_stored_events().await {
        Ok(total) => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                event_store: "connected",
                high_water_mark: Some(total),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    status: "not_ready",
                    event_store: "unavailable",
                    high_water_mark: None,
                }),
            )
        }
    }
}

/// Run the server with graceful shutdown support.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::hash_secret;
    use axum::body::Body;
    use axum::http::{Request, Response, header};
    use notilog_core::config::{
        AdminConfig, FeedConfig, ProducerConfig, PublisherConfig, ServerConfig, SharedConfig,
    };
    use notilog_core::events::{PublishTick, PublishTickReceiver, publish_tick_channel};
    use notilog_core::notification::{EventTypeRegistry, NotificationSerializer};
    use notilog_core::processors::PublisherStatus;
    use notilog_core::store::{EventStore, InMemoryEventStore, NewEvent};
    use notilog_core::tracker::InMemoryTrackerStore;
    use notilog_sdk::objects::{
        AppendEventRequest, AppendEventResponse, NotificationLogRepresentation,
        PublisherStatusResponse,
    };
    use notilog_sdk::signature::{ADMIN_AUTH_HEADER, SIGNATURE_HEADER, SignedObject};
    use std::sync::Arc;
    use tokio::sync::watch;
    use tower::ServiceExt;

    const ADMIN_SECRET: &str = "admin-secret";
    const PRODUCER_SECRET: &[u8] = b"producer-secret";

    struct Harness {
        router: Router,
        store: Arc<InMemoryEventStore>,
        ticks: PublishTickReceiver,
        _status_tx: watch::Sender<PublisherStatus>,
    }

    fn harness(page_size: u64) -> Harness {
        let config = SharedConfig::new(
            ServerConfig {
                listen: "127.0.0.1:0".parse().unwrap(),
            },
            AdminConfig::new(hash_secret(ADMIN_SECRET).unwrap()),
            ProducerConfig::new(PRODUCER_SECRET),
            FeedConfig {
                page_size,
                ..FeedConfig::default()
            },
            PublisherConfig::default(),
        );
        let store = Arc::new(InMemoryEventStore::new());
        let (publish_ticks, ticks) = publish_tick_channel();
        let (status_tx, publisher_status) = watch::channel(PublisherStatus {
            running: true,
            cursor: Some(0),
            ..PublisherStatus::default()
        });
        let state = AppState {
            config,
            store: store.clone(),
            tracker: Arc::new(InMemoryTrackerStore::new("notilog")),
            serializer: NotificationSerializer::new(Arc::new(EventTypeRegistry::new())),
            publish_ticks,
            publisher_status,
        };
        Harness {
            router: build_router(state),
            store,
            ticks,
            _status_tx: status_tx,
        }
    }

    async fn seed(store: &InMemoryEventStore, count: usize) {
        for i in 0..count {
            store
                .append(NewEvent::new(
                    "BacklogItemCommitted",
                    format!(r#"{{"item":{i}}}"#),
                    time::OffsetDateTime::UNIX_EPOCH,
                ))
                .await
                .unwrap();
        }
    }

    async fn get(router: &Router, uri: &str) -> Response<Body> {
        router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn signed_append(request: AppendEventRequest, key: &[u8]) -> Request<Body> {
        let signed = SignedObject::new(request, key).unwrap();
        Request::post("/api/v1/events")
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signed.to_header())
            .body(Body::from(signed.json))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let h = harness(10);
        assert_eq!(get(&h.router, "/health").await.status(), StatusCode::OK);
        let ready = get(&h.router, "/ready").await;
        assert_eq!(ready.status(), StatusCode::OK);
        let body: serde_json::Value = json(ready).await;
        assert_eq!(body["high_water_mark"], 0);
    }

    #[tokio::test]
    async fn test_current_page_of_empty_feed_is_no_content() {
        let h = harness(10);
        let response = get(&h.router, "/api/v1/notifications").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = get(&h.router, "/api/v1/notifications/current").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_feed_pages_and_cache_headers() {
        let h = harness(10);
        seed(&h.store, 25).await;

        let current = get(&h.router, "/api/v1/notifications").await;
        assert_eq!(current.status(), StatusCode::OK);
        assert_eq!(current.headers()[header::CACHE_CONTROL], "max-age=60");
        let log: NotificationLogRepresentation = json(current).await;
        assert_eq!(log.id, "21-25");
        assert_eq!(log.self_link, "/api/v1/notifications/21-25");
        assert_eq!(log.previous_link.as_deref(), Some("/api/v1/notifications/11-20"));
        assert!(log.next_link.is_none());
        assert_eq!(log.notifications.len(), 5);
        assert_eq!(log.notifications[0].body["item"], 20);

        let by_name = get(&h.router, "/api/v1/notifications/current").await;
        assert_eq!(by_name.headers()[header::CACHE_CONTROL], "max-age=60");
        let by_name: NotificationLogRepresentation = json(by_name).await;
        assert_eq!(by_name.id, "21-25");

        let archived = get(&h.router, "/api/v1/notifications/11-20").await;
        assert_eq!(archived.status(), StatusCode::OK);
        assert_eq!(archived.headers()[header::CACHE_CONTROL], "max-age=3600");
        let log: NotificationLogRepresentation = json(archived).await;
        assert!(log.archived);
        assert_eq!(log.next_link.as_deref(), Some("/api/v1/notifications/21-30"));
    }

    #[tokio::test]
    async fn test_unknown_or_malformed_pages_are_not_found() {
        let h = harness(10);
        seed(&h.store, 5).await;
        for uri in [
            "/api/v1/notifications/11-20",
            "/api/v1/notifications/abc",
            "/api/v1/notifications/5-1",
            "/api/v1/notifications/1-50",
        ] {
            assert_eq!(get(&h.router, uri).await.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_signed_append_is_stored_and_nudges_scheduler() {
        let mut h = harness(10);
        let request = AppendEventRequest {
            type_name: "SprintStarted".into(),
            occurred_on: None,
            payload: serde_json::json!({ "sprint": "s-1" }),
        };
        let response = h
            .router
            .clone()
            .oneshot(signed_append(request, PRODUCER_SECRET))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let appended: AppendEventResponse = json(response).await;
        assert_eq!(appended.event_id, 1);

        let stored = h.store.all_stored_events_since(0).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].type_name, "SprintStarted");
        assert_eq!(
            h.ticks.try_recv().unwrap(),
            PublishTick::EventAppended { event_id: 1 }
        );
    }

    #[tokio::test]
    async fn test_append_with_wrong_key_is_rejected() {
        let h = harness(10);
        let request = AppendEventRequest {
            type_name: "SprintStarted".into(),
            occurred_on: None,
            payload: serde_json::json!({}),
        };
        let response = h
            .router
            .clone()
            .oneshot(signed_append(request, b"someone-else"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let unsigned = Request::post("/api/v1/events")
            .body(Body::from(r#"{"type_name":"X","payload":{}}"#))
            .unwrap();
        let response = h.router.clone().oneshot(unsigned).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.store.count_stored_events().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_admin_endpoints_require_secret() {
        let mut h = harness(10);
        seed(&h.store, 3).await;

        let response = get(&h.router, "/api/v1/admin/publisher").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let wrong = Request::get("/api/v1/admin/publisher")
            .header(ADMIN_AUTH_HEADER, "guess")
            .body(Body::empty())
            .unwrap();
        let response = h.router.clone().oneshot(wrong).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let status = Request::get("/api/v1/admin/publisher")
            .header(ADMIN_AUTH_HEADER, ADMIN_SECRET)
            .body(Body::empty())
            .unwrap();
        let response = h.router.clone().oneshot(status).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: PublisherStatusResponse = json(response).await;
        assert_eq!(body.exchange, "notilog");
        assert_eq!(body.tracker, 0);
        assert_eq!(body.high_water_mark, 3);
        assert_eq!(body.pending, 3);
        assert!(body.running);

        let publish = Request::post("/api/v1/admin/publisher/publish")
            .header(ADMIN_AUTH_HEADER, ADMIN_SECRET)
            .body(Body::empty())
            .unwrap();
        let response = h.router.clone().oneshot(publish).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(h.ticks.try_recv().unwrap(), PublishTick::Manual);
    }
}
