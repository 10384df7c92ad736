//! Event ingestion for producers.
//!
//! # Endpoints
//!
//! - `POST /events` – append a signed event; nudges the publish scheduler

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use notilog_core::events::PublishTick;
use notilog_core::store::{NewEvent, StoreError};
use notilog_sdk::objects::{AppendEventRequest, AppendEventResponse};

use crate::api::extractors::SignedBody;
use crate::state::AppState;

/// Build the ingestion router.
pub fn router() -> Router<AppState> {
    Router::new().route("/events", post(append_event))
}

/// `POST /events` - append an event to the store.
///
/// The payload is stored as the JSON bytes the producer sent; `occurred_on`
/// defaults to the time of receipt.
async fn append_event(
    State(state): State<AppState>,
    SignedBody(request): SignedBody<AppendEventRequest>,
) -> Result<impl IntoResponse, EventsApiError> {
    if request.type_name.trim().is_empty() {
        return Err(EventsApiError::InvalidTypeName);
    }
    let payload = serde_json::to_vec(&request.payload).map_err(EventsApiError::Payload)?;
    let occurred_on = request
        .occurred_on
        .unwrap_or_else(time::OffsetDateTime::now_utc);

    let stored = state
        .store
        .append(NewEvent::new(request.type_name, payload, occurred_on))
        .await
        .map_err(EventsApiError::Store)?;

    tracing::info!(
        event_id = stored.event_id,
        type_name = %stored.type_name,
        "Event appended"
    );
    state.publish_ticks.nudge(PublishTick::EventAppended {
        event_id: stored.event_id,
    });

    Ok((
        StatusCode::CREATED,
        Json(AppendEventResponse {
            event_id: stored.event_id,
            occurred_on: stored.occurred_on,
        }),
    ))
}

#[derive(Debug)]
pub(crate) enum EventsApiError {
    InvalidTypeName,
    Payload(serde_json::Error),
    Store(StoreError),
}

impl IntoResponse for EventsApiError {
    fn into_response(self) -> Response {
        match self {
            EventsApiError::InvalidTypeName => {
                (StatusCode::BAD_REQUEST, "type_name must not be empty").into_response()
            }
            EventsApiError::Payload(e) => {
                (StatusCode::BAD_REQUEST, format!("invalid payload: {e}")).into_response()
            }
            EventsApiError::Store(e) => {
                tracing::error!(error = %e, "Event append failed");
                (StatusCode::SERVICE_UNAVAILABLE, "event store unavailable").into_response()
            }
        }
    }
}
