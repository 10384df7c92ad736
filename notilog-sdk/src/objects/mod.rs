pub mod admin;
pub mod event;
pub mod notification;

pub use admin::{PublishOutcomeResponse, PublisherStatusResponse};
pub use event::{AppendEventRequest, AppendEventResponse};
pub use notification::{NotificationLogRepresentation, NotificationRepresentation};
