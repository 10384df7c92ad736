//! Runtime configuration re-exports.
//!
//! The actual config types are defined in `notilog_core::config`.

pub use notilog_core::config::{
    AdminConfig, BusConfig, FeedConfig, ProducerConfig, PublisherConfig, ServerConfig,
    SharedConfig,
};
