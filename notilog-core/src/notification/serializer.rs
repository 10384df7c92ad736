use std::sync::Arc;

use bytes::Bytes;
use notilog_sdk::objects::NotificationRepresentation;

use super::{CodecError, EventTypeRegistry, Notification};

/// Turns notifications into their wire representation.
///
/// The same representation is the push message body and the feed entry,
/// so both delivery paths carry identical fields.
#[derive(Debug, Clone, Default)]
pub struct NotificationSerializer {
    registry: Arc<EventTypeRegistry>,
}

impl NotificationSerializer {
    pub fn new(registry: Arc<EventTypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &EventTypeRegistry {
        &self.registry
    }

    pub fn to_representation(
        &self,
        notification: &Notification,
    ) -> Result<NotificationRepresentation, CodecError> {
        Ok(NotificationRepresentation {
            id: notification.notification_id,
            type_name: notification.type_name.clone(),
            occurred_on: notification.occurred_on,
            body: self
                .registry
                .decode(&notification.type_name, &notification.body)?,
        })
    }

    /// The push message body: the JSON representation.
    pub fn serialize(&self, notification: &Notification) -> Result<Bytes, CodecError> {
        let representation = self.to_representation(notification)?;
        Ok(serde_json::to_vec(&representation)?.into())
    }
}
