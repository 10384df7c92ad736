//! PostgreSQL rows and the kanau processors that read and write them.

pub mod published_tracker;
pub mod stored_event;
