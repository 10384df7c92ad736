//! Event type definitions.

/// A request for the scheduler to run a publish cycle now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishTick {
    /// The scheduler's own interval elapsed.
    Timer,
    /// An event was appended to the store.
    EventAppended { event_id: u64 },
    /// An operator asked for a cycle through the admin API.
    Manual,
}

impl std::fmt::Display for PublishTick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishTick::Timer => write!(f, "timer"),
            PublishTick::EventAppended { event_id } => write!(f, "appended:{event_id}"),
            PublishTick::Manual => write!(f, "manual"),
        }
    }
}
