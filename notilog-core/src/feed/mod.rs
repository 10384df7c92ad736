//! Pull-based notification feed.
//!
//! The [`NotificationLogReader`] serves the stored event stream as linked,
//! fixed-size pages. It keeps no state between calls: every read computes
//! the page from the store's high-water mark, so two reads of a page with a
//! successor always return the same content.

mod pagination;

pub use pagination::{CURRENT_LOG_ID, InvalidLogId, NotificationLogId};

use std::sync::Arc;
use std::time::Duration;

use notilog_sdk::objects::NotificationLogRepresentation;
use thiserror::Error;
use tracing::debug;

use crate::config::FeedConfig;
use crate::notification::{CodecError, Notification, NotificationSerializer};
use crate::store::{EventStore, StoreError, ensure_contiguous};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    InvalidLogId(#[from] InvalidLogId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One page of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationLog {
    pub id: NotificationLogId,
    pub notifications: Vec<Notification>,
    pub next: Option<NotificationLogId>,
    pub previous: Option<NotificationLogId>,
    /// The page has a successor and will never change again.
    pub archived: bool,
}

impl NotificationLog {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// How long clients may cache this page.
    pub fn max_age(&self, config: &FeedConfig) -> Duration {
        if self.archived {
            config.archived_max_age
        } else {
            config.current_max_age
        }
    }

    /// Wire form, with links built as `{link_base}/{id}`.
    pub fn to_representation(
        &self,
        serializer: &NotificationSerializer,
        link_base: &str,
    ) -> Result<NotificationLogRepresentation, CodecError> {
        let link = |id: &NotificationLogId| format!("{link_base}/{id}");
        Ok(NotificationLogRepresentation {
            id: self.id.to_string(),
            self_link: link(&self.id),
            previous_link: self.previous.as_ref().map(link),
            next_link: self.next.as_ref().map(link),
            archived: self.archived,
            notifications: self
                .notifications
                .iter()
                .map(|n| serializer.to_representation(n))
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Clone)]
pub struct NotificationLogReader {
    store: Arc<dyn EventStore>,
    page_size: u64,
}

impl NotificationLogReader {
    pub fn new(store: Arc<dyn EventStore>, page_size: u64) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// The highest page, `None` for an empty store.
    pub async fn current_notification_log(&self) -> Result<Option<NotificationLog>, FeedError> {
        let total = self.store.count_stored_events().await?;
        let Some(id) = NotificationLogId::current(total, self.page_size) else {
            return Ok(None);
        };
        Ok(Some(self.load(id, total).await?))
    }

    /// The page named by `log_id` (`"low-high"` or `"current"`).
    ///
    /// A range reaching past the high-water mark is cut at it; one starting
    /// beyond it does not exist yet.
    pub async fn notification_log(&self, log_id: &str) -> Result<Option<NotificationLog>, FeedError> {
        if log_id == CURRENT_LOG_ID {
            return self.current_notification_log().await;
        }
        let requested = NotificationLogId::parse(log_id, self.page_size)?;
        let total = self.store.count_stored_events().await?;
        let Some(id) = requested.clamp_to(total) else {
            debug!(%requested, total, "Requested page is beyond the high-water mark");
            return Ok(None);
        };
        Ok(Some(self.load(id, total).await?))
    }

    async fn load(&self, id: NotificationLogId, total: u64) -> Result<NotificationLog, FeedError> {
        let events = self
            .store
            .all_stored_events_between(id.low(), id.high())
            .await?;
        ensure_contiguous(&events, id.low())?;
        if events.len() as u64 != id.width() {
            return Err(StoreError::Discontinuity {
                expected: id.low() + events.len() as u64,
                found: 0,
            }
            .into());
        }

        let next = id.next(total, self.page_size);
        Ok(NotificationLog {
            id,
            notifications: Notification::from_stored_events(events),
            next,
            previous: id.previous(self.page_size),
            archived: next.is_some(),
        })
    }
}
