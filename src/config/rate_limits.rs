use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed-window quota applied to each API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(100, 60)
    }
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Index of the window containing `now`.
pub fn current_window(now: u64, window_seconds: u64) -> u64 {
    now / window_seconds
}

/// Unix timestamp at which the given window closes.
pub fn window_reset_at(window: u64, window_seconds: u64) -> u64 {
    (window + 1) * window_seconds
}
