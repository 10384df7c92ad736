//! Event system driving the publish scheduler.
//!
//! # Event Flow
//!
//! 1. Event ingestion appends to the store and emits `PublishTick::EventAppended`
//! 2. The admin API emits `PublishTick::Manual`
//! 3. `PublishScheduler` runs one publish cycle per tick, plus one per timer interval
//!
//! Ticks are idempotent nudges. They carry no data the publisher relies on:
//! each cycle re-reads the tracker and the store, so a dropped tick only
//! delays delivery until the next one.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, PublishTickReceiver, PublishTickSender, publish_tick_channel,
};

pub use types::PublishTick;
