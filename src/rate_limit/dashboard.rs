//! Admin Dashboard Support
//!
//! Data structures for monitoring sessions and adjusting the limiter at
//! runtime via the admin endpoints.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::config::RateLimitConfig;
use super::manager::{RateLimiter, SessionUsage};
use super::session::SessionId;
use super::store::UsageRecord;

/// Number of history records included in a dashboard snapshot
pub const RECENT_HISTORY_LEN: usize = 100;

/// Dashboard data for admin interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    /// Timestamp of data generation
    pub timestamp: DateTime<Utc>,

    /// Summary statistics
    pub summary: UsageSummary,

    /// Per-session usage
    pub sessions: Vec<SessionUsage>,

    /// Most recent decisions, newest first
    pub recent_history: Vec<UsageRecord>,

    /// Current configuration
    pub config: RateLimitConfig,
}

/// Summary of limiter activity across all sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Sessions currently tracked
    pub total_sessions: usize,

    /// Sessions that would be denied right now
    pub limited_sessions: usize,

    /// Allowed decisions in the retained history
    pub allowed_count: u64,

    /// Denied decisions in the retained history
    pub denied_count: u64,

    /// Share of denied decisions
    pub denial_rate_percent: f64,
}

/// Dashboard builder for constructing dashboard data
pub struct DashboardBuilder {
    limiter: RateLimiter,
}

impl DashboardBuilder {
    /// Create a new dashboard builder
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }

    /// Build dashboard data as of `now`
    pub async fn build(&self, now: DateTime<Utc>) -> DashboardData {
        let mut sessions = self.limiter.all_usage(now).await;
        sessions.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

        let config = self.limiter.get_config().await;
        let history = self.limiter.store().get_all_usage_history().await;

        let summary = Self::build_summary(&sessions, &history);
        let recent_history: Vec<UsageRecord> =
            history.into_iter().rev().take(RECENT_HISTORY_LEN).collect();

        DashboardData {
            timestamp: now,
            summary,
            sessions,
            recent_history,
            config,
        }
    }

    fn build_summary(sessions: &[SessionUsage], history: &[UsageRecord]) -> UsageSummary {
        let limited_sessions = sessions.iter().filter(|s| s.seconds_remaining > 0).count();
        let allowed_count = history.iter().filter(|r| r.decision.is_allowed()).count() as u64;
        let denied_count = history.len() as u64 - allowed_count;

        let denial_rate_percent = if history.is_empty() {
            0.0
        } else {
            (denied_count as f64 / history.len() as f64) * 100.0
        };

        UsageSummary {
            total_sessions: sessions.len(),
            limited_sessions,
            allowed_count,
            denied_count,
            denial_rate_percent,
        }
    }
}

/// Admin action for adjusting the limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    /// Clear a session's block, counter and events
    Unblock { session_id: SessionId },

    /// Replace the limiter configuration
    UpdateConfig { config: RateLimitConfig },

    /// Drop sessions idle for longer than `idle_secs`
    PurgeIdle { idle_secs: u64 },
}

/// What an admin action did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminOutcome {
    Unblocked { found: bool },
    ConfigUpdated,
    Purged { removed: usize },
}

impl AdminAction {
    /// Execute the admin action
    pub async fn execute(
        &self,
        limiter: &RateLimiter,
        now: DateTime<Utc>,
    ) -> anyhow::Result<AdminOutcome> {
        match self {
            AdminAction::Unblock { session_id } => Ok(AdminOutcome::Unblocked {
                found: limiter.unblock(session_id).await,
            }),
            AdminAction::UpdateConfig { config } => {
                config.validate()?;
                limiter.update_config(config.clone()).await;
                Ok(AdminOutcome::ConfigUpdated)
            }
            AdminAction::PurgeIdle { idle_secs } => {
                let ttl = TimeDelta::seconds((*idle_secs).min(i64::MAX as u64) as i64);
                Ok(AdminOutcome::Purged {
                    removed: limiter.purge_idle(now, ttl).await,
                })
            }
        }
    }
}
