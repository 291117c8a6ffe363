use crate::error::RateLimitError;
use async_trait::async_trait;
use engine_config::RateLimitSettings;
use governor::{DefaultDirectRateLimiter, Quota};
use std::{fmt, num::NonZeroU32};

/// Kind of operation a permit is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    Write,
    Select,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Write => "write",
            OperationKind::Select => "select",
        };
        f.write_str(s)
    }
}

/// Throttle consulted once per ingestion cycle. May suspend the caller.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn intercept(&self, kind: OperationKind, permits: u32) -> Result<(), RateLimitError>;
}

/// Token bucket that allows `permits_per_second` with bursts of up to `burst`.
pub struct QpsRateLimiter {
    limiter: DefaultDirectRateLimiter,
    burst: NonZeroU32,
}

impl QpsRateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Result<Self, RateLimitError> {
        let rate = NonZeroU32::new(settings.permits_per_second)
            .ok_or_else(|| RateLimitError::Other("permits_per_second must be > 0".into()))?;
        let burst = NonZeroU32::new(settings.burst)
            .ok_or_else(|| RateLimitError::Other("burst must be > 0".into()))?;

        let quota = Quota::per_second(rate).allow_burst(burst);
        Ok(Self {
            limiter: DefaultDirectRateLimiter::direct(quota),
            burst,
        })
    }
}

#[async_trait]
impl RateLimiter for QpsRateLimiter {
    async fn intercept(&self, _kind: OperationKind, permits: u32) -> Result<(), RateLimitError> {
        let Some(n) = NonZeroU32::new(permits) else {
            return Ok(());
        };

        self.limiter
            .until_n_ready(n)
            .await
            .map_err(|_| RateLimitError::InsufficientCapacity {
                requested: permits,
                capacity: self.burst.get(),
            })
    }
}
