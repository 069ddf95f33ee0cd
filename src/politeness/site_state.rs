use std::time::Duration;
use tokio::time::Instant;

/// Rate-limiting state for one site
///
/// Holds the next-eligible-time watermark the gate enforces between granted
/// fetches. All methods take `now` explicitly so the arithmetic can be tested
/// without a clock.
#[derive(Debug, Clone, Default)]
pub struct SiteState {
    /// Earliest instant at which the next fetch may start
    pub next_eligible: Option<Instant>,

    /// Number of fetches granted so far
    pub granted: u64,
}

impl SiteState {
    /// Creates a fresh state with no fetch granted yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a fetch may start at `now`
    pub fn can_request(&self, now: Instant) -> bool {
        self.time_until_next_request(now).is_none()
    }

    /// Calculates the time until the next fetch may start
    ///
    /// Returns None if a fetch can start now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        match self.next_eligible {
            Some(next) if next > now => Some(next - now),
            _ => None,
        }
    }

    /// Records a granted fetch and moves the watermark forward by `delay`
    pub fn record_request(&mut self, now: Instant, delay: Duration) {
        self.granted += 1;
        self.next_eligible = Some(now + delay);
    }
}
