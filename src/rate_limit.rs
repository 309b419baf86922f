//! Call-rate limiting for the refinement collaborator.
//!
//! The limiter is an owned object with an injected clock, so each caller
//! decides its own budget and tests can drive time by hand.

use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, time::Duration};
use tracing::debug;

use crate::error::ConfigError;

/// Calls allowed per window by default
pub const DEFAULT_CALL_LIMIT: u32 = 5;

/// Default window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

type DirectLimiter<C> =
    RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Allows `limit` calls in a burst, then one more every `window / limit`
pub struct CallRateLimiter<C: Clock = DefaultClock> {
    limiter: DirectLimiter<C>,
    clock: C,
    limit: u32,
    window: Duration,
}

impl CallRateLimiter<DefaultClock> {
    pub fn new(limit: u32, window: Duration) -> Result<Self, ConfigError> {
        Self::with_clock(limit, window, DefaultClock::default())
    }
}

impl<C: Clock> CallRateLimiter<C> {
    pub fn with_clock(limit: u32, window: Duration, clock: C) -> Result<Self, ConfigError> {
        let burst = NonZeroU32::new(limit).ok_or(ConfigError::ZeroRateLimit)?;
        let quota = Quota::with_period(window / limit)
            .ok_or(ConfigError::ZeroRateLimit)?
            .allow_burst(burst);

        Ok(CallRateLimiter {
            limiter: RateLimiter::direct_with_clock(quota, &clock),
            clock,
            limit,
            window,
        })
    }

    /// Take one call slot if available
    pub fn try_acquire(&self) -> bool {
        match self.limiter.check() {
            Ok(()) => true,
            Err(negative) => {
                let wait = negative.wait_time_from(self.clock.now());
                debug!(
                    limit = self.limit,
                    window_secs = self.window.as_secs(),
                    wait_ms = wait.as_millis() as u64,
                    "refinement call denied by rate limiter"
                );
                false
            }
        }
    }
}
