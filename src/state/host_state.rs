use std::time::{Duration, Instant};

/// Politeness state of one registrable domain
///
/// Tracks when the next request may start so that a robots `Crawl-delay`
/// spaces requests to the host even when several workers hold host permits.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests started against this host
    pub request_count: u64,

    /// Start time of the most recent (or most recently reserved) request
    pub last_request_time: Option<Instant>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time to wait before a request may start, or None if it may start now
    pub fn time_until_next_request(&self, now: Instant, delay: Duration) -> Option<Duration> {
        let last = self.last_request_time?;
        let ready_at = last + delay;
        if ready_at > now {
            Some(ready_at - now)
        } else {
            None
        }
    }

    /// Reserves the next start slot and returns how long to sleep for it
    ///
    /// The slot is recorded immediately so concurrent callers queue up behind
    /// each other instead of all waking at the same instant.
    pub fn reserve(&mut self, now: Instant, delay: Duration) -> Duration {
        let wait = self.time_until_next_request(now, delay).unwrap_or_default();
        self.record_request(now + wait);
        wait
    }

    /// Records that a request started at `at`
    pub fn record_request(&mut self, at: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_host_state() {
        let state = HostState::new();
        assert_eq!(state.request_count, 0);
        assert!(state.last_request_time.is_none());
    }

    #[test]
    fn test_first_request_needs_no_wait() {
        let state = HostState::new();
        assert_eq!(
            state.time_until_next_request(Instant::now(), Duration::from_secs(1)),
            None
        );
    }

    #[test]
    fn test_wait_after_recent_request() {
        let mut state = HostState::new();
        let now = Instant::now();
        state.record_request(now);

        let wait = state
            .time_until_next_request(now + Duration::from_millis(300), Duration::from_secs(1))
            .unwrap();
        assert_eq!(wait, Duration::from_millis(700));

        assert_eq!(
            state.time_until_next_request(now + Duration::from_secs(2), Duration::from_secs(1)),
            None
        );
    }

    #[test]
    fn test_reservations_queue_up() {
        let mut state = HostState::new();
        let now = Instant::now();
        let delay = Duration::from_millis(500);

        assert_eq!(state.reserve(now, delay), Duration::ZERO);
        assert_eq!(state.reserve(now, delay), Duration::from_millis(500));
        assert_eq!(state.reserve(now, delay), Duration::from_millis(1000));
        assert_eq!(state.request_count, 3);
    }

    #[test]
    fn test_zero_delay_never_waits() {
        let mut state = HostState::new();
        let now = Instant::now();
        for _ in 0..5 {
            assert_eq!(state.reserve(now, Duration::ZERO), Duration::ZERO);
        }
    }
}
