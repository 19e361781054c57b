use anyhow::Result;
use uuid::Uuid;

use crate::config::rate_limits::{current_window, unix_now, window_reset_at, RateLimitPolicy};
use crate::infra::cache::RedisCache;

/// Quota state after counting one request, used for the response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limited: bool,
    pub limit: u32,
    pub remaining: u32,
    pub count: u64,
    pub reset_at: u64,
}

impl RateLimitInfo {
    pub fn from_count(count: u64, policy: RateLimitPolicy, window: u64) -> Self {
        let limit = policy.max_requests;
        let remaining = u64::from(limit).saturating_sub(count) as u32;
        Self {
            limited: count > u64::from(limit),
            limit,
            remaining,
            count,
            reset_at: window_reset_at(window, policy.window_seconds),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: RedisCache,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(cache: RedisCache, policy: RateLimitPolicy) -> Self {
        Self { cache, policy }
    }

    pub async fn check(&self, key_id: Uuid) -> Result<RateLimitInfo> {
        self.check_at(key_id, unix_now()).await
    }

    /// Counts one request against the window containing `now` (unix seconds).
    ///
    /// The increment and the TTL are applied in one MULTI/EXEC, so concurrent
    /// requests never observe the same count.
    pub async fn check_at(&self, key_id: Uuid, now: u64) -> Result<RateLimitInfo> {
        let window_seconds = self.policy.window_seconds;
        let window = current_window(now, window_seconds);
        let key = format!("ratelimit:apikey:{}:{}", key_id, window);

        let mut conn = self.cache.connection().await?;
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&key, 1u64)
            .expire(&key, window_seconds as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        let info = RateLimitInfo::from_count(count, self.policy, window);
        if info.limited {
            tracing::debug!(
                key_id = %key_id,
                count = count,
                limit = info.limit,
                "rate limit exceeded"
            );
        }
        Ok(info)
    }
}
