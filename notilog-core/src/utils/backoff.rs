use std::time::Duration;

/// Doubling stops after this many consecutive failures.
pub const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Upper bound on the delay between failing publish cycles.
pub const MAX_PUBLISH_DELAY: Duration = Duration::from_secs(5 * 60);

/// Returns the delay before the next scheduled publish cycle.
///
/// Uses exponential backoff: `interval * 2^failures`, with the exponent
/// capped at [`MAX_BACKOFF_EXPONENT`] and the result capped at
/// [`MAX_PUBLISH_DELAY`]. An interval longer than the cap is kept as is.
pub fn next_publish_delay(interval: Duration, consecutive_failures: u32) -> Duration {
    let factor = 2u32.pow(consecutive_failures.min(MAX_BACKOFF_EXPONENT));
    interval
        .saturating_mul(factor)
        .min(MAX_PUBLISH_DELAY.max(interval))
}
