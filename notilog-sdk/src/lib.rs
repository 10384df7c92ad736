//! Shared wire types and helpers for the notilog notification feed.
//!
//! - [`objects`]: JSON representations served by the feed and accepted by
//!   the ingestion and admin APIs.
//! - [`signature`]: HMAC-SHA256 signing used for ingestion and push delivery.
//! - `client` (feature `client`): typed HTTP clients.

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
