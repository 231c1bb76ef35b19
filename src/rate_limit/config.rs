//! Rate Limit Configuration
//!
//! Configuration for the per-session generation limiter.

use anyhow::Result;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default number of generations allowed per window (sliding window)
pub const DEFAULT_MAX_REQUESTS: u32 = 2;

/// Default window / cool-down length: 15 minutes
pub const DEFAULT_WINDOW_SECS: u64 = 15 * 60;

/// Upper bound for the window so time arithmetic can never overflow
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 3600;

/// Which limiting strategy a session is subject to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// Count requests inside a trailing window
    SlidingWindow,
    /// Block every request for a fixed duration once a counter hits the limit
    FixedCooldown,
}

impl RateLimitPolicy {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitPolicy::SlidingWindow => "sliding_window",
            RateLimitPolicy::FixedCooldown => "fixed_cooldown",
        }
    }
}

impl fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "sliding_window" | "sliding" => Ok(RateLimitPolicy::SlidingWindow),
            "fixed_cooldown" | "cooldown" | "fixed" => Ok(RateLimitPolicy::FixedCooldown),
            other => anyhow::bail!(
                "Invalid rate limit policy: {}. Must be one of: sliding_window, fixed_cooldown",
                other
            ),
        }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Limiting strategy
    pub policy: RateLimitPolicy,

    /// Allowed generations per window, or the cool-down threshold
    pub max_requests: u32,

    /// Sliding window length, or cool-down duration, in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: RateLimitPolicy::SlidingWindow,
            max_requests: DEFAULT_MAX_REQUESTS,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Sliding window allowing `max_requests` per `window`
    pub fn sliding_window(max_requests: u32, window: Duration) -> Self {
        Self {
            enabled: true,
            policy: RateLimitPolicy::SlidingWindow,
            max_requests,
            window_secs: window.as_secs(),
        }
    }

    /// Fixed cool-down of `cooldown` after `threshold` generations
    pub fn fixed_cooldown(threshold: u32, cooldown: Duration) -> Self {
        Self {
            enabled: true,
            policy: RateLimitPolicy::FixedCooldown,
            max_requests: threshold,
            window_secs: cooldown.as_secs(),
        }
    }

    /// Disable rate limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Apply `PROMPTGATE_*` environment overrides; invalid values are ignored
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("PROMPTGATE_RATE_LIMIT_ENABLED") {
            self.enabled = val.parse().unwrap_or(self.enabled);
        }

        if let Ok(val) = std::env::var("PROMPTGATE_RATE_LIMIT_POLICY") {
            if let Ok(policy) = val.parse() {
                self.policy = policy;
            }
        }

        if let Ok(val) = std::env::var("PROMPTGATE_MAX_REQUESTS") {
            if let Ok(limit) = val.parse::<u32>() {
                if limit > 0 {
                    self.max_requests = limit;
                }
            }
        }

        if let Ok(val) = std::env::var("PROMPTGATE_WINDOW_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                if secs > 0 && secs <= MAX_WINDOW_SECS {
                    self.window_secs = secs;
                }
            }
        }

        self
    }

    /// Window (or cool-down) for timestamp arithmetic
    pub fn window(&self) -> TimeDelta {
        TimeDelta::seconds(self.window_secs.min(MAX_WINDOW_SECS) as i64)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            anyhow::bail!("rate_limit.max_requests must be > 0");
        }
        if self.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be > 0");
        }
        if self.window_secs > MAX_WINDOW_SECS {
            anyhow::bail!("rate_limit.window_secs must be <= {}", MAX_WINDOW_SECS);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.policy, RateLimitPolicy::SlidingWindow);
        assert_eq!(config.max_requests, DEFAULT_MAX_REQUESTS);
        assert_eq!(config.window_secs, 900);
    }

    #[test]
    fn test_disabled_config() {
        let config = RateLimitConfig::disabled();
        assert!(!config.enabled);
    }

    #[test]
    fn test_constructors() {
        let sliding = RateLimitConfig::sliding_window(3, Duration::from_secs(60));
        assert_eq!(sliding.policy, RateLimitPolicy::SlidingWindow);
        assert_eq!(sliding.max_requests, 3);
        assert_eq!(sliding.window(), TimeDelta::seconds(60));

        let fixed = RateLimitConfig::fixed_cooldown(5, Duration::from_secs(900));
        assert_eq!(fixed.policy, RateLimitPolicy::FixedCooldown);
        assert_eq!(fixed.window(), TimeDelta::seconds(900));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "sliding-window".parse::<RateLimitPolicy>().unwrap(),
            RateLimitPolicy::SlidingWindow
        );
        assert_eq!(
            "FIXED_COOLDOWN".parse::<RateLimitPolicy>().unwrap(),
            RateLimitPolicy::FixedCooldown
        );
        assert!("token_bucket".parse::<RateLimitPolicy>().is_err());
    }

    #[test]
    fn test_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());

        let mut config = RateLimitConfig::default();
        config.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = RateLimitConfig::default();
        config.window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = RateLimitConfig::default();
        config.window_secs = MAX_WINDOW_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = RateLimitConfig::fixed_cooldown(5, Duration::from_secs(300));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"fixed_cooldown\""));
        let parsed: RateLimitConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
