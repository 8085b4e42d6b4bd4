//! Global rate limiting using a token bucket

use crate::handler::NotifyError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use deskflow_common::config::RateLimitConfig;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

pub type GlobalRateLimiter = DefaultDirectRateLimiter;

/// Build the limiter, or `None` when rate limiting is disabled
pub fn from_config(config: &RateLimitConfig) -> Option<Arc<GlobalRateLimiter>> {
    config
        .enabled
        .then(|| create_rate_limiter(config.requests_per_second, config.burst))
}

/// Zero rates are raised to one
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Arc<GlobalRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);

    Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)))
}

/// Reject with 429 once the bucket is empty
pub async fn limit(
    State(limiter): State<Arc<GlobalRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            NotifyError::RateLimited.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_enforced() {
        let limiter = create_rate_limiter(1, 2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_disabled_config_builds_nothing() {
        let config = RateLimitConfig {
            requests_per_second: 10,
            burst: 20,
            enabled: false,
        };
        assert!(from_config(&config).is_none());
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let limiter = create_rate_limiter(0, 0);
        assert!(limiter.check().is_ok());
    }
}
