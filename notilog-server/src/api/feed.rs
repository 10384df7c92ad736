//! Notification feed handlers.
//!
//! # Endpoints
//!
//! - `GET /notifications`          – the current page, 204 for an empty store
//! - `GET /notifications/{log_id}` – page `low-high`, 404 if absent; `current` as above
//!
//! Pages carry `Cache-Control: max-age`, long for archived pages and short
//! for the page that is still growing.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use notilog_core::config::FeedConfig;
use notilog_core::feed::{CURRENT_LOG_ID, FeedError, NotificationLog, NotificationLogReader};
use notilog_core::notification::CodecError;

use crate::state::AppState;

/// Absolute path the page links are built on.
pub const FEED_PATH: &str = "/api/v1/notifications";

/// Build the feed router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(current_notification_log))
        .route("/notifications/{log_id}", get(notification_log))
}

async fn reader(state: &AppState) -> (NotificationLogReader, FeedConfig) {
    let feed = state.config.feed.read().await.clone();
    (
        NotificationLogReader::new(state.store.clone(), feed.page_size),
        feed,
    )
}

fn render(state: &AppState, feed: &FeedConfig, log: NotificationLog) -> Result<Response, FeedApiError> {
    let representation = log.to_representation(&state.serializer, FEED_PATH)?;
    let cache_control = format!("max-age={}", log.max_age(feed).as_secs());
    Ok(([(header::CACHE_CONTROL, cache_control)], Json(representation)).into_response())
}

/// `GET /notifications` - the current page.
async fn current_notification_log(State(state): State<AppState>) -> Result<Response, FeedApiError> {
    let (reader, feed) = reader(&state).await;
    match reader.current_notification_log().await? {
        Some(log) => render(&state, &feed, log),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// `GET /notifications/{log_id}` - a specific page.
///
/// `current` answers exactly like `GET /notifications`.
async fn notification_log(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
) -> Result<Response, FeedApiError> {
    if log_id == CURRENT_LOG_ID {
        return current_notification_log(State(state)).await;
    }
    let (reader, feed) = reader(&state).await;
    match reader.notification_log(&log_id).await? {
        Some(log) => render(&state, &feed, log),
        None => Err(FeedApiError::NotFound),
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum FeedApiError {
    NotFound,
    Feed(FeedError),
}

impl From<FeedError> for FeedApiError {
    fn from(e: FeedError) -> Self {
        Self::Feed(e)
    }
}

impl From<CodecError> for FeedApiError {
    fn from(e: CodecError) -> Self {
        Self::Feed(FeedError::Codec(e))
    }
}

impl IntoResponse for FeedApiError {
    fn into_response(self) -> Response {
        match self {
            FeedApiError::NotFound | FeedApiError::Feed(FeedError::InvalidLogId(_)) => {
                (StatusCode::NOT_FOUND, "notification log not found").into_response()
            }
            FeedApiError::Feed(FeedError::Store(e)) => {
                tracing::error!(error = %e, "Feed read failed");
                (StatusCode::SERVICE_UNAVAILABLE, "event store unavailable").into_response()
            }
            FeedApiError::Feed(FeedError::Codec(e)) => {
                tracing::error!(error = %e, "Failed to encode notification log");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
