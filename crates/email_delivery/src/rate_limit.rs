use std::time::Duration;

use tokio::time::Instant;

use crate::types::RateLimitStatus;

/// Length of a rate limit window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Fixed request budget per rolling 60-second window.
///
/// The window is reset lazily: the first call after `reset_at` has passed starts a new
/// window anchored at that call.
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    requests_per_minute: u32,
    current_requests: u32,
    reset_at: Option<Instant>,
}

impl RateLimitWindow {
    /// Creates a window that starts on the first request.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            current_requests: 0,
            reset_at: None,
        }
    }

    /// Takes one request from the budget, returning false when it is exhausted.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.roll(now);

        if self.current_requests < self.requests_per_minute {
            self.current_requests += 1;
            true
        } else {
            false
        }
    }

    /// Current state of the window.
    pub fn status(&self, now: Instant) -> RateLimitStatus {
        match self.reset_at {
            Some(reset_at) if now < reset_at => RateLimitStatus {
                limit: self.requests_per_minute,
                current: self.current_requests,
                resets_in_ms: reset_at.saturating_duration_since(now).as_millis() as u64,
            },
            _ => RateLimitStatus {
                limit: self.requests_per_minute,
                current: 0,
                resets_in_ms: 0,
            },
        }
    }

    fn roll(&mut self, now: Instant) {
        let expired = self.reset_at.is_none_or(|reset_at| now >= reset_at);
        if expired {
            self.current_requests = 0;
            self.reset_at = Some(now + WINDOW);
        }
    }
}
