/// Rate limiting for the credential endpoints
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

const AUTH_PREFIX: &str = "/api/v1/auth/";

/// Process-wide limiter shared by every POST under `/api/v1/auth/`
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    auth: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.auth_requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.auth_burst).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Self {
            enabled: config.enabled,
            auth: Arc::new(GovernorLimiter::direct(quota)),
        }
    }

    /// Take one token from the auth bucket
    pub fn check_auth(&self) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.auth.check() {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Err(ApiError::RateLimitExceeded {
                    retry_after: wait.max(Duration::from_secs(1)),
                })
            }
        }
    }
}

/// Whether a request counts against the auth bucket
fn is_limited(method: &Method, path: &str) -> bool {
    method == Method::POST && path.starts_with(AUTH_PREFIX)
}

/// Middleware answering 429 with `Retry-After` once the bucket is empty
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    if is_limited(request.method(), request.uri().path()) {
        if let Err(e) = ctx.rate_limiter.check_auth() {
            tracing::warn!(path = %request.uri().path(), "Auth rate limit exceeded");
            return e.into_response();
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled,
            auth_requests_per_second: 1,
            auth_burst: burst,
        }
    }

    #[test]
    fn test_burst_then_limited() {
        let limiter = RateLimiter::new(&config(true, 3));
        for _ in 0..3 {
            assert!(limiter.check_auth().is_ok());
        }
        match limiter.check_auth() {
            Err(ApiError::RateLimitExceeded { retry_after }) => {
                assert!(retry_after >= Duration::from_secs(1));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn test_disabled_never_limits() {
        let limiter = RateLimiter::new(&config(false, 1));
        for _ in 0..10 {
            assert!(limiter.check_auth().is_ok());
        }
    }

    #[test]
    fn test_only_auth_posts_are_limited() {
        assert!(is_limited(&Method::POST, "/api/v1/auth/login"));
        assert!(!is_limited(&Method::GET, "/api/v1/auth/me"));
        assert!(!is_limited(&Method::POST, "/api/v1/posts"));
    }
}
