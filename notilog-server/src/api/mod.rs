//! HTTP API, mounted under `/api/v1`.
//!
//! - `feed`: public notification feed
//! - `events`: signed event ingestion for producers
//! - `admin`: publisher status and manual publishing

pub mod admin;
pub mod events;
pub mod extractors;
pub mod feed;

use axum::Router;

use crate::state::AppState;

/// Build the versioned API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(feed::router())
        .merge(events::router())
        .nest("/admin", admin::router())
}
