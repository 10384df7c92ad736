//! Feed and push representations of notifications.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A single notification as delivered by both the push path (message body)
/// and the pull path (feed entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRepresentation {
    /// Store-assigned id, strictly increasing. Consumers deduplicate on it.
    pub id: u64,
    pub type_name: CompactString,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_on: time::OffsetDateTime,
    /// The event payload, decoded through the server's type registry.
    pub body: serde_json::Value,
}

/// One page of the notification feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLogRepresentation {
    /// The page id, `"{low}-{high}"`.
    pub id: String,
    pub self_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
    /// `true` once the page is complete and will never change again.
    pub archived: bool,
    pub notifications: Vec<NotificationRepresentation>,
}

impl NotificationLogRepresentation {
    /// Notifications with an id strictly greater than `after`, in feed order.
    pub fn notifications_after(&self, after: u64) -> impl Iterator<Item = &NotificationRepresentation> {
        self.notifications.iter().filter(move |n| n.id > after)
    }

    /// Whether this page holds notifications at or below `id`, meaning a
    /// consumer walking backwards from the current page can stop here.
    pub fn reaches_back_to(&self, id: u64) -> bool {
        self.previous_link.is_none()
            || self.notifications.first().is_some_and(|n| n.id <= id)
    }
}
