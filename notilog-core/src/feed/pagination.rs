//! Page arithmetic for the notification feed.
//!
//! Pages are inclusive id ranges aligned on multiples of the page size `P`:
//! `[1, P]`, `[P + 1, 2P]`, and so on. The highest page is cut off at the
//! high-water mark `N` and grows as events are appended. Every function here
//! is pure over `(N, P, range)`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Logical id of the highest page.
pub const CURRENT_LOG_ID: &str = "current";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid notification log id: {0:?}")]
pub struct InvalidLogId(pub String);

/// An inclusive range of notification ids, rendered as `"low-high"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationLogId {
    low: u64,
    high: u64,
}

impl NotificationLogId {
    pub fn new(low: u64, high: u64) -> Option<Self> {
        (low >= 1 && low <= high).then_some(Self { low, high })
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    /// Number of ids covered by the range.
    pub fn width(&self) -> u64 {
        self.high - self.low + 1
    }

    /// The highest page for `total` notifications, `None` when there are none.
    pub fn current(total: u64, page_size: u64) -> Option<Self> {
        let page_size = page_size.max(1);
        if total == 0 {
            return None;
        }
        Some(Self {
            low: (total - 1) / page_size * page_size + 1,
            high: total,
        })
    }

    /// Parse a `"low-high"` id no wider than one page.
    pub fn parse(value: &str, page_size: u64) -> Result<Self, InvalidLogId> {
        let id: Self = value.parse()?;
        if id.width() > page_size.max(1) {
            return Err(InvalidLogId(value.to_string()));
        }
        Ok(id)
    }

    /// The aligned page ending right before this one.
    pub fn previous(&self, page_size: u64) -> Option<Self> {
        let page_size = page_size.max(1);
        if self.low <= 1 {
            return None;
        }
        let high = self.low - 1;
        Some(Self {
            low: (high - 1) / page_size * page_size + 1,
            high,
        })
    }

    /// The aligned page starting right after this one, if any id beyond
    /// `high` exists.
    pub fn next(&self, total: u64, page_size: u64) -> Option<Self> {
        let page_size = page_size.max(1);
        if self.high >= total {
            return None;
        }
        let low = self.high + 1;
        Some(Self {
            low,
            high: ((low - 1) / page_size + 1) * page_size,
        })
    }

    /// Cut the range at `total`; `None` if it starts beyond it.
    pub fn clamp_to(&self, total: u64) -> Option<Self> {
        if self.low > total {
            return None;
        }
        Some(Self {
            low: self.low,
            high: self.high.min(total),
        })
    }
}

impl fmt::Display for NotificationLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

impl FromStr for NotificationLogId {
    type Err = InvalidLogId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidLogId(s.to_string());
        let (low, high) = s.split_once('-').ok_or_else(invalid)?;
        let low: u64 = low.parse().map_err(|_| invalid())?;
        let high: u64 = high.parse().map_err(|_| invalid())?;
        Self::new(low, high).ok_or_else(invalid)
    }
}
