//! Admin API handlers.
//!
//! These endpoints require the `Notilog-Admin-Authorization` header with the
//! plaintext admin secret.
//!
//! # Endpoints
//!
//! - `GET  /publisher`         – tracker cursor, high-water mark and scheduler status
//! - `POST /publisher/publish` – nudge the scheduler into an immediate cycle

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use notilog_core::events::PublishTick;
use notilog_core::processors::PublishOutcome;
use notilog_core::store::StoreError;
use notilog_core::tracker::TrackerError;
use notilog_sdk::objects::{PublishOutcomeResponse, PublisherStatusResponse};

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/publisher", get(publisher_status))
        .route("/publisher/publish", post(trigger_publish))
}

fn outcome_response(outcome: &PublishOutcome) -> PublishOutcomeResponse {
    PublishOutcomeResponse {
        published: outcome.published,
        cursor_before: outcome.cursor_before,
        cursor_after: outcome.cursor_after,
    }
}

/// `GET /publisher` - where the publisher stands.
async fn publisher_status(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<Json<PublisherStatusResponse>, AdminApiError> {
    let tracker = state.tracker.read().await.map_err(AdminApiError::Tracker)?;
    let high_water_mark = state
        .store
        .count_stored_events()
        .await
        .map_err(AdminApiError::Store)?;
    let status = state.publisher_status.borrow().clone();
    let cursor = tracker.most_recent_published_notification_id;

    Ok(Json(PublisherStatusResponse {
        exchange: tracker.exchange_name.to_string(),
        tracker: cursor,
        high_water_mark,
        pending: high_water_mark.saturating_sub(cursor),
        running: status.running,
        consecutive_failures: status.consecutive_failures,
        last_outcome: status.last_outcome.as_ref().map(outcome_response),
        last_error: status.last_error,
        last_success_at: status.last_success_at,
        last_attempt_at: status.last_attempt_at,
    }))
}

/// `POST /publisher/publish` - request a cycle now.
async fn trigger_publish(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<StatusCode, AdminApiError> {
    if !state.publisher_status.borrow().running {
        return Err(AdminApiError::SchedulerStopped);
    }
    // A dropped nudge means the queue is full and a cycle is already due.
    state.publish_ticks.nudge(PublishTick::Manual);
    Ok(StatusCode::ACCEPTED)
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum AdminApiError {
    Store(StoreError),
    Tracker(TrackerError),
    SchedulerStopped,
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> Response {
        match self {
            AdminApiError::Store(e) => {
                tracing::error!(error = %e, "Admin API store error");
                (StatusCode::SERVICE_UNAVAILABLE, "event store unavailable").into_response()
            }
            AdminApiError::Tracker(e) => {
                tracing::error!(error = %e, "Admin API tracker error");
                (StatusCode::SERVICE_UNAVAILABLE, "tracker unavailable").into_response()
            }
            AdminApiError::SchedulerStopped => {
                (StatusCode::SERVICE_UNAVAILABLE, "publish scheduler is not running")
                    .into_response()
            }
        }
    }
}
