//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;
use crate::ratelimit::{LimiterSet, RateLimitPolicy};

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Rate limiting configuration.
///
/// Three policies are configured per instance. The defaults mirror a
/// conventional web-application posture: a narrow ceiling on login
/// attempts, a moderate per-minute budget for API traffic, and a lenient
/// catch-all for everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Interval between eviction sweeps, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Policy for login endpoints
    #[serde(default = "default_login_policy")]
    pub login: PolicyConfig,

    /// Policy for API paths
    #[serde(default = "default_api_policy")]
    pub api: PolicyConfig,

    /// Policy for all other paths
    #[serde(default = "default_default_policy")]
    pub default: PolicyConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            login: default_login_policy(),
            api: default_api_policy(),
            default: default_default_policy(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_login_policy() -> PolicyConfig {
    // 5 attempts per 15 minutes
    PolicyConfig {
        window_ms: 15 * 60 * 1000,
        max_requests: 5,
    }
}

fn default_api_policy() -> PolicyConfig {
    // 30 requests per minute
    PolicyConfig {
        window_ms: 60 * 1000,
        max_requests: 30,
    }
}

fn default_default_policy() -> PolicyConfig {
    // 100 requests per 15 minutes
    PolicyConfig {
        window_ms: 15 * 60 * 1000,
        max_requests: 100,
    }
}

/// Configuration for a single rate limit policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Length of the counting window in milliseconds
    pub window_ms: u64,
    /// Maximum requests admitted per key within one window
    pub max_requests: u32,
}

impl PolicyConfig {
    /// Validate this configuration into a policy value.
    pub fn to_policy(&self) -> Result<RateLimitPolicy> {
        RateLimitPolicy::new(Duration::from_millis(self.window_ms), self.max_requests)
    }
}

impl RateLimitingConfig {
    /// Build the limiter set from this configuration.
    ///
    /// Fails if any policy is misconfigured, so invalid values are caught
    /// at startup rather than per-request.
    pub fn build_limiters(&self) -> Result<LimiterSet> {
        Ok(LimiterSet::new(
            self.login.to_policy()?,
            self.api.to_policy()?,
            self.default.to_policy()?,
        ))
    }

    /// Get the sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TurnstileConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TurnstileError::Config(e.to_string()))?;
        Ok(config)
    }
}
