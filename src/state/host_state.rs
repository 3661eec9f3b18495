use std::time::{Duration, Instant};

/// Tracks request pacing for one host
///
/// The fetch engine keeps one of these per host key behind an async mutex,
/// so the delay computation and the request it guards are serialized.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests made to this host since startup
    pub request_count: u64,

    /// When the last request to this host was sent
    pub last_request_time: Option<Instant>,

    /// Crawl-delay advertised by the host's robots.txt
    pub robots_delay: Option<Duration>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The larger of the configured delay and the robots.txt crawl-delay
    pub fn effective_delay(&self, configured: Duration) -> Duration {
        match self.robots_delay {
            Some(robots) => configured.max(robots),
            None => configured,
        }
    }

    /// Checks whether a request may be sent now
    pub fn can_request(&self, configured: Duration, now: Instant) -> bool {
        self.time_until_next_request(configured, now).is_none()
    }

    /// Returns how long to wait before the next request, if at all
    pub fn time_until_next_request(&self, configured: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let delay = self.effective_delay(configured);
        let elapsed = now.saturating_duration_since(last);
        (elapsed < delay).then(|| delay - elapsed)
    }

    /// Records that a request was sent
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }
}
