//! Rate limit policies and path-based policy selection.
//!
//! A policy is an immutable pair of window duration and request ceiling.
//! Three named policies exist per service instance: a strict one for login
//! endpoints, a moderate one for general API traffic, and a lenient default
//! for everything else. Selection is a static path match performed before
//! the admission check.

use std::time::Duration;

use crate::error::{Result, TurnstileError};

use super::limiter::FixedWindowLimiter;

/// An immutable rate limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Length of the fixed counting window
    window: Duration,
    /// Maximum requests admitted per key within one window
    max_requests: u32,
}

impl RateLimitPolicy {
    /// Create a new policy.
    ///
    /// Fails with a configuration error if the window is zero or the
    /// request ceiling is zero. Misconfiguration is rejected here, before
    /// any traffic is served, rather than discovered per-request.
    pub fn new(window: Duration, max_requests: u32) -> Result<Self> {
        if window.is_zero() {
            return Err(TurnstileError::Config(
                "rate limit window must be greater than zero".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(TurnstileError::Config(
                "rate limit max_requests must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            window,
            max_requests,
        })
    }

    /// Get the window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Get the window duration in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }

    /// Get the maximum requests admitted per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

/// The named policy classes a request path can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Strict policy for authentication endpoints
    Login,
    /// Moderate policy for general API traffic
    Api,
    /// Lenient policy for all other paths
    Default,
}

/// Classify a request path to a policy kind.
///
/// Login paths match exactly; API paths match on prefix; everything else
/// falls through to the default policy.
pub fn classify_path(path: &str) -> PolicyKind {
    if path == "/api/auth/login" || path == "/api/auth/signin" {
        return PolicyKind::Login;
    }
    if path.starts_with("/api/") {
        return PolicyKind::Api;
    }
    PolicyKind::Default
}

/// The set of limiter instances for one service, one per policy kind.
///
/// Each limiter owns its own window state; exhausting the login quota for a
/// key has no effect on that key's API quota.
pub struct LimiterSet {
    login: FixedWindowLimiter,
    api: FixedWindowLimiter,
    default: FixedWindowLimiter,
}

impl LimiterSet {
    /// Create a limiter set from three policies.
    pub fn new(
        login: RateLimitPolicy,
        api: RateLimitPolicy,
        default: RateLimitPolicy,
    ) -> Self {
        Self {
            login: FixedWindowLimiter::new(login),
            api: FixedWindowLimiter::new(api),
            default: FixedWindowLimiter::new(default),
        }
    }

    /// Get the limiter for a policy kind.
    pub fn get(&self, kind: PolicyKind) -> &FixedWindowLimiter {
        match kind {
            PolicyKind::Login => &self.login,
            PolicyKind::Api => &self.api,
            PolicyKind::Default => &self.default,
        }
    }

    /// Get the limiter governing a request path.
    pub fn limiter_for(&self, path: &str) -> &FixedWindowLimiter {
        self.get(classify_path(path))
    }

    /// Sweep expired windows from every limiter.
    ///
    /// Returns the total number of evicted entries.
    pub fn sweep_expired(&self, now_ms: i64) -> usize {
        self.login.sweep_expired(now_ms)
            + self.api.sweep_expired(now_ms)
            + self.default.sweep_expired(now_ms)
    }

    /// Get the total number of tracked windows across all limiters.
    pub fn window_count(&self) -> usize {
        self.login.window_count() + self.api.window_count() + self.default.window_count()
    }
}
