//! Session identity and per-session limiter state.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Opaque session identifier.
///
/// Used only to key limiter state and to correlate log lines; it is not a
/// credential.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a caller-supplied identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Limiter state for one session
///
/// Both policy representations live here; the configured policy decides
/// which one is read. `blocked_until` is only ever set to a time after the
/// moment it was set.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Session identifier
    pub id: SessionId,

    /// First interaction
    pub created_at: DateTime<Utc>,

    /// Most recent check against this session
    pub last_seen: DateTime<Utc>,

    /// Timestamps of consumed generations (sliding window)
    pub usage_events: VecDeque<DateTime<Utc>>,

    /// Generations since the last unblock (fixed cool-down)
    pub counter: u32,

    /// End of the current cool-down, if any
    pub blocked_until: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Fresh state with zero usage
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            last_seen: now,
            usage_events: VecDeque::new(),
            counter: 0,
            blocked_until: None,
        }
    }

    /// Drop all usage and any block
    pub fn reset(&mut self) {
        self.usage_events.clear();
        self.counter = 0;
        self.blocked_until = None;
    }

    /// Whether the session has been idle for longer than `ttl`
    pub fn is_idle(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now - self.last_seen > ttl
    }

    /// Whether any usage still counts against the limit at `now`
    ///
    /// True while a consumed generation is inside `window`, a cool-down is
    /// in force, or a pending counter was last bumped inside `window`.
    pub fn holds_quota(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        let live_event = self.usage_events.iter().any(|t| now - *t < window);
        let blocked = self.blocked_until.is_some_and(|until| until > now);
        let pending = self.counter > 0 && now - self.last_seen < window;
        live_event || blocked || pending
    }
}
