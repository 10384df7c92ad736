//! Notification feed configuration.

use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const DEFAULT_CURRENT_MAX_AGE: Duration = Duration::from_secs(60);
pub const DEFAULT_ARCHIVED_MAX_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Notifications per page, also the alignment of page boundaries.
    pub page_size: u64,
    /// Cache lifetime of a page that can still grow.
    pub current_max_age: Duration,
    /// Cache lifetime of a page that has a successor.
    pub archived_max_age: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            current_max_age: DEFAULT_CURRENT_MAX_AGE,
            archived_max_age: DEFAULT_ARCHIVED_MAX_AGE,
        }
    }
}
