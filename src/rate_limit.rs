//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tracing::warn;

use crate::api::ApiError;
use crate::auth::extract_client_ip;
use crate::server_config;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const LOGIN_BURST: u32 = 5;
const LOGIN_REPLENISH: Duration = Duration::from_secs(2);
const REGISTER_PER_MINUTE: u32 = 3;

/// Rate limiting configuration for credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Login: burst of 5, one more every 2 seconds
    pub login: Arc<IpLimiter>,
    /// Registration: 3 per minute
    pub register: Arc<IpLimiter>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::with_limits(LOGIN_BURST, LOGIN_REPLENISH, REGISTER_PER_MINUTE)
    }

    /// Custom limits. Zero values are raised to one.
    pub fn with_limits(login_burst: u32, login_replenish: Duration, register_per_minute: u32) -> Self {
        let login_burst = NonZeroU32::new(login_burst).unwrap_or(NonZeroU32::MIN);
        let register_per_minute = NonZeroU32::new(register_per_minute).unwrap_or(NonZeroU32::MIN);
        let login_quota = Quota::with_period(login_replenish)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(login_burst);

        Self {
            login: Arc::new(RateLimiter::keyed(login_quota)),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(register_per_minute))),
        }
    }

    /// Limits high enough never to trigger in tests.
    pub fn permissive() -> Self {
        Self::with_limits(10_000, Duration::from_millis(1), 10_000)
    }

    /// Drop state for clients whose buckets are full again.
    pub fn retain_recent(&self) {
        self.login.retain_recent();
        self.register.retain_recent();
    }
}

fn check(limiter: &IpLimiter, request: &Request, message: &'static str) -> Result<(), ApiError> {
    let ip = extract_client_ip(request, server_config::trust_forwarded_for()).map_err(|e| {
        warn!(reason = e, "Unable to determine client IP");
        ApiError::forbidden("Unable to determine client IP.")
    })?;
    limiter
        .check_key(&ip)
        .map_err(|_| ApiError::too_many_requests(message))
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.login,
        &request,
        "Too many login attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.register,
        &request,
        "Too many signup attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_burst_then_limited() {
        let config = RateLimitConfig::new();
        let ip = "203.0.113.1".to_string();
        for _ in 0..LOGIN_BURST {
            assert!(config.login.check_key(&ip).is_ok());
        }
        assert!(config.login.check_key(&ip).is_err());

        // Other clients are unaffected.
        assert!(config.login.check_key(&"203.0.113.2".to_string()).is_ok());
    }

    #[test]
    fn test_register_per_minute() {
        let config = RateLimitConfig::new();
        let ip = "203.0.113.1".to_string();
        for _ in 0..REGISTER_PER_MINUTE {
            assert!(config.register.check_key(&ip).is_ok());
        }
        assert!(config.register.check_key(&ip).is_err());
    }

    #[test]
    fn test_zero_limits_are_raised() {
        let config = RateLimitConfig::with_limits(0, Duration::ZERO, 0);
        let ip = "203.0.113.1".to_string();
        assert!(config.login.check_key(&ip).is_ok());
        assert!(config.register.check_key(&ip).is_ok());
    }
}
