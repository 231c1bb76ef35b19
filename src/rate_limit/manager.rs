//! Rate Limiter
//!
//! Central entry point: one limiter state per session, confined to that
//! session and serialized by its own mutex.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::config::{RateLimitConfig, RateLimitPolicy};
use super::policy::{self, Decision};
use super::session::{SessionId, SessionState};
use super::store::{SessionStore, UsageRecord};
use crate::metrics;

/// Current usage of one session, as seen at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUsage {
    /// Session identifier
    pub session_id: SessionId,

    /// Policy in force
    pub policy: RateLimitPolicy,

    /// Generations counted against the limit
    pub used: u32,

    /// Configured limit
    pub limit: u32,

    /// Generations left before a denial
    pub remaining: u32,

    /// End of the current cool-down, if blocked
    pub blocked_until: Option<DateTime<Utc>>,

    /// Seconds until the next generation is allowed (0 if allowed now)
    pub seconds_remaining: u64,

    /// First interaction
    pub created_at: DateTime<Utc>,

    /// Most recent check
    pub last_seen: DateTime<Utc>,
}

impl SessionUsage {
    fn from_state(state: &SessionState, config: &RateLimitConfig, now: DateTime<Utc>) -> Self {
        let window = config.window();
        let (used, blocked_until) = match config.policy {
            RateLimitPolicy::SlidingWindow => {
                let live = state
                    .usage_events
                    .iter()
                    .filter(|t| now - **t < window)
                    .count();
                (live as u32, None)
            }
            RateLimitPolicy::FixedCooldown => {
                let blocked = state.blocked_until.filter(|until| *until > now);
                // An elapsed block resets the counter on the next check
                let used = if state.blocked_until.is_some() && blocked.is_none() {
                    0
                } else {
                    state.counter
                };
                (used, blocked)
            }
        };

        let decision = policy::evaluate(state, config, now);
        let remaining = if decision.is_allowed() {
            config.max_requests.saturating_sub(used)
        } else {
            0
        };

        Self {
            session_id: state.id.clone(),
            policy: config.policy,
            used,
            limit: config.max_requests,
            remaining,
            blocked_until,
            seconds_remaining: decision.seconds_remaining(),
            created_at: state.created_at,
            last_seen: state.last_seen,
        }
    }
}

/// Per-session rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Configuration
    config: Arc<RwLock<RateLimitConfig>>,

    /// Session store
    store: SessionStore,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            store: SessionStore::new(),
        }
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Create a disabled rate limiter (for testing)
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    /// Check the quota for a session and consume one generation if allowed.
    ///
    /// Creates the session on first use. Never fails.
    pub async fn check_and_consume(&self, session: &SessionId, now: DateTime<Utc>) -> Decision {
        let config = self.config.read().await.clone();
        let handle = self.store.get_or_create(session, now).await;

        let decision = {
            let mut state = handle.lock().await;
            policy::check_and_consume(&mut state, &config, now)
        };

        if config.enabled {
            self.store.record_usage(session, now, decision).await;
        }

        metrics::RATE_LIMIT_DECISIONS_TOTAL
            .with_label_values(&[config.policy.as_str(), decision.as_str()])
            .inc();

        match decision {
            Decision::Allowed => {
                tracing::debug!(session_id = %session, policy = %config.policy, "Generation allowed");
            }
            Decision::Denied { seconds_remaining } => {
                tracing::warn!(
                    session_id = %session,
                    policy = %config.policy,
                    seconds_remaining,
                    "Generation denied by rate limit"
                );
            }
        }

        decision
    }

    /// Dry run: would a generation be allowed right now?
    ///
    /// Unknown sessions evaluate as fresh and are not created.
    pub async fn evaluate(&self, session: &SessionId, now: DateTime<Utc>) -> Decision {
        let config = self.config.read().await.clone();
        match self.store.get(session).await {
            Some(handle) => {
                let state = handle.lock().await;
                policy::evaluate(&state, &config, now)
            }
            None => policy::evaluate(&SessionState::new(session.clone(), now), &config, now),
        }
    }

    /// Usage of an existing session
    pub async fn usage(&self, session: &SessionId, now: DateTime<Utc>) -> Option<SessionUsage> {
        let config = self.config.read().await.clone();
        let handle = self.store.get(session).await?;
        let state = handle.lock().await;
        Some(SessionUsage::from_state(&state, &config, now))
    }

    /// Usage of every tracked session
    pub async fn all_usage(&self, now: DateTime<Utc>) -> Vec<SessionUsage> {
        let config = self.config.read().await.clone();
        self.store
            .snapshot_all()
            .await
            .iter()
            .map(|state| SessionUsage::from_state(state, &config, now))
            .collect()
    }

    /// Explicitly unblock a session, clearing its block, counter and events.
    ///
    /// Returns false if the session is unknown.
    pub async fn unblock(&self, session: &SessionId) -> bool {
        match self.store.get(session).await {
            Some(handle) => {
                handle.lock().await.reset();
                tracing::info!(session_id = %session, "Session unblocked by admin");
                true
            }
            None => false,
        }
    }

    /// Drop sessions idle for longer than `ttl`
    ///
    /// Sessions whose usage still counts under the current window are kept.
    pub async fn purge_idle(&self, now: DateTime<Utc>, ttl: TimeDelta) -> usize {
        let window = self.config.read().await.window();
        let removed = self.store.purge_idle(now, ttl, window).await;
        if removed > 0 {
            metrics::SESSIONS_PURGED_TOTAL.inc_by(removed as u64);
            tracing::info!(removed, "Purged idle sessions");
        }
        removed
    }

    /// Decision history of one session
    pub async fn get_usage_history(&self, session: &SessionId) -> Vec<UsageRecord> {
        self.store.get_usage_history(session).await
    }

    /// Update configuration
    pub async fn update_config(&self, config: RateLimitConfig) {
        let mut current = self.config.write().await;
        tracing::info!(
            policy = %config.policy,
            max_requests = config.max_requests,
            window_secs = config.window_secs,
            "Rate limit configuration updated"
        );
        *current = config;
    }

    /// Get current configuration
    pub async fn get_config(&self) -> RateLimitConfig {
        self.config.read().await.clone()
    }

    /// Get session store (for dashboard)
    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_limiter_creation() {
        let limiter = RateLimiter::default_config();
        let config = limiter.get_config().await;
        assert!(config.enabled);
        assert_eq!(config.max_requests, 2);
    }

    #[tokio::test]
    async fn test_check_and_consume_denies_after_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::sliding_window(
            2,
            Duration::from_secs(900),
        ));
        let id = SessionId::new("tab-1");

        assert!(limiter.check_and_consume(&id, t0()).await.is_allowed());
        assert!(limiter
            .check_and_consume(&id, t0() + TimeDelta::minutes(1))
            .await
            .is_allowed());

        let denied = limiter
            .check_and_consume(&id, t0() + TimeDelta::minutes(2))
            .await;
        assert_eq!(denied, Decision::Denied { seconds_remaining: 780 });
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig::sliding_window(
            1,
            Duration::from_secs(60),
        ));
        let a = SessionId::new("a");
        let b = SessionId::new("b");

        assert!(limiter.check_and_consume(&a, t0()).await.is_allowed());
        assert!(!limiter.check_and_consume(&a, t0()).await.is_allowed());

        // Session b is untouched by a's exhaustion
        assert!(limiter.check_and_consume(&b, t0()).await.is_allowed());
    }

    #[tokio::test]
    async fn test_evaluate_is_dry_run() {
        let limiter = RateLimiter::default_config();
        let id = SessionId::new("peek");

        for _ in 0..10 {
            assert!(limiter.evaluate(&id, t0()).await.is_allowed());
        }
        // Unknown sessions are not created by a dry run
        assert_eq!(limiter.store().count().await, 0);

        limiter.check_and_consume(&id, t0()).await;
        let usage = limiter.usage(&id, t0()).await.unwrap();
        assert_eq!(usage.used, 1);

        limiter.evaluate(&id, t0()).await;
        let usage = limiter.usage(&id, t0()).await.unwrap();
        assert_eq!(usage.used, 1);
    }

    #[tokio::test]
    async fn test_disabled_allows_all() {
        let limiter = RateLimiter::disabled();
        let id = SessionId::new("tab-1");

        for _ in 0..200 {
            assert!(limiter.check_and_consume(&id, t0()).await.is_allowed());
        }
        assert!(limiter.get_usage_history(&id).await.is_empty());
    }

    #[tokio::test]
    async fn test_usage_reports_block() {
        let limiter = RateLimiter::new(RateLimitConfig::fixed_cooldown(
            2,
            Duration::from_secs(600),
        ));
        let id = SessionId::new("tab-1");

        limiter.check_and_consume(&id, t0()).await;
        let usage = limiter.usage(&id, t0()).await.unwrap();
        assert_eq!(usage.used, 1);
        assert_eq!(usage.remaining, 1);
        assert!(usage.blocked_until.is_none());

        limiter.check_and_consume(&id, t0()).await;
        let usage = limiter.usage(&id, t0() + TimeDelta::seconds(100)).await.unwrap();
        assert_eq!(usage.remaining, 0);
        assert_eq!(usage.seconds_remaining, 500);
        assert_eq!(usage.blocked_until, Some(t0() + TimeDelta::seconds(600)));

        // Once the block has elapsed the full quota is reported again
        let usage = limiter.usage(&id, t0() + TimeDelta::seconds(601)).await.unwrap();
        assert_eq!(usage.used, 0);
        assert_eq!(usage.remaining, 2);
        assert!(usage.blocked_until.is_none());
    }

    #[tokio::test]
    async fn test_unblock() {
        let limiter = RateLimiter::new(RateLimitConfig::fixed_cooldown(
            1,
            Duration::from_secs(600),
        ));
        let id = SessionId::new("tab-1");

        limiter.check_and_consume(&id, t0()).await;
        assert!(!limiter.check_and_consume(&id, t0()).await.is_allowed());

        assert!(limiter.unblock(&id).await);
        assert!(limiter.check_and_consume(&id, t0()).await.is_allowed());

        assert!(!limiter.unblock(&SessionId::new("unknown")).await);
    }

    #[tokio::test]
    async fn test_history_records_decisions() {
        let limiter = RateLimiter::new(RateLimitConfig::sliding_window(
            1,
            Duration::from_secs(60),
        ));
        let id = SessionId::new("tab-1");

        limiter.check_and_consume(&id, t0()).await;
        limiter.check_and_consume(&id, t0()).await;

        let history = limiter.get_usage_history(&id).await;
        assert_eq!(history.len(), 2);
        assert!(history[0].decision.is_allowed());
        assert!(!history[1].decision.is_allowed());
    }

    #[tokio::test]
    async fn test_update_config_applies_to_next_check() {
        let limiter = RateLimiter::new(RateLimitConfig::sliding_window(
            1,
            Duration::from_secs(60),
        ));
        let id = SessionId::new("tab-1");

        limiter.check_and_consume(&id, t0()).await;
        assert!(!limiter.evaluate(&id, t0()).await.is_allowed());

        limiter
            .update_config(RateLimitConfig::sliding_window(3, Duration::from_secs(60)))
            .await;
        assert!(limiter.evaluate(&id, t0()).await.is_allowed());
    }

    #[tokio::test]
    async fn test_purge_idle_sessions() {
        let limiter = RateLimiter::default_config();
        limiter.check_and_consume(&SessionId::new("a"), t0()).await;
        limiter.check_and_consume(&SessionId::new("b"), t0()).await;

        let removed = limiter
            .purge_idle(t0() + TimeDelta::hours(2), TimeDelta::hours(1))
            .await;
        assert_eq!(removed, 2);
        assert_eq!(limiter.store().count().await, 0);
    }

    #[tokio::test]
    async fn test_purge_does_not_reset_live_quota() {
        let limiter = RateLimiter::new(RateLimitConfig::sliding_window(
            2,
            Duration::from_secs(2 * 24 * 3600),
        ));
        let id = SessionId::new("long-window");

        assert!(limiter.check_and_consume(&id, t0()).await.is_allowed());
        assert!(limiter.check_and_consume(&id, t0()).await.is_allowed());

        let later = t0() + TimeDelta::hours(25);
        assert_eq!(limiter.purge_idle(later, TimeDelta::hours(24)).await, 0);
        assert_eq!(
            limiter.check_and_consume(&id, later).await,
            Decision::Denied { seconds_remaining: 82_800 }
        );
    }

    #[tokio::test]
    async fn test_purge_does_not_lift_cooldown() {
        let limiter = RateLimiter::new(RateLimitConfig::fixed_cooldown(
            1,
            Duration::from_secs(2 * 24 * 3600),
        ));
        let id = SessionId::new("blocked");

        assert!(limiter.check_and_consume(&id, t0()).await.is_allowed());

        let later = t0() + TimeDelta::hours(25);
        assert_eq!(limiter.purge_idle(later, TimeDelta::hours(24)).await, 0);
        assert!(!limiter.check_and_consume(&id, later).await.is_allowed());
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_exceed_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::sliding_window(
            5,
            Duration::from_secs(900),
        ));
        let id = SessionId::new("racy");

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let limiter = limiter.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                limiter.check_and_consume(&id, t0()).await
            }));
        }

        let mut allowed = 0;
        for task in tasks {
            if task.await.unwrap().is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }
}
