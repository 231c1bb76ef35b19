//! Session Store
//!
//! In-memory storage for per-session limiter state. Nothing is persisted:
//! a restart starts every session from zero.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::policy::Decision;
use super::session::{SessionId, SessionState};
use crate::metrics;

/// Maximum number of decisions kept for the dashboard
pub const MAX_HISTORY: usize = 10_000;

/// Shared handle to one session's state
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Record of a limiter decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Session the decision was made for
    pub session_id: SessionId,

    /// Time of the check
    pub timestamp: DateTime<Utc>,

    /// What the limiter decided
    pub decision: Decision,
}

/// In-memory session store
///
/// The map lock is only held to look up or insert a session; limiter
/// evaluation happens under the per-session mutex.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    /// Session states
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,

    /// Decision history (for the dashboard)
    usage_history: Arc<RwLock<VecDeque<UsageRecord>>>,
}

impl SessionStore {
    /// Create a new session store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the state for a session
    pub async fn get_or_create(&self, id: &SessionId, now: DateTime<Utc>) -> SessionHandle {
        if let Some(handle) = self.get(id).await {
            return handle;
        }

        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(id.clone())
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, "Creating session state");
                Arc::new(Mutex::new(SessionState::new(id.clone(), now)))
            })
            .clone();
        metrics::ACTIVE_SESSIONS.set(sessions.len() as i64);
        handle
    }

    /// Get a session if it exists
    pub async fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Record a decision
    pub async fn record_usage(&self, id: &SessionId, now: DateTime<Utc>, decision: Decision) {
        let record = UsageRecord {
            session_id: id.clone(),
            timestamp: now,
            decision,
        };

        let mut history = self.usage_history.write().await;
        history.push_back(record);
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    /// Decision history for one session
    pub async fn get_usage_history(&self, id: &SessionId) -> Vec<UsageRecord> {
        let history = self.usage_history.read().await;
        history
            .iter()
            .filter(|r| &r.session_id == id)
            .cloned()
            .collect()
    }

    /// Get all usage history
    pub async fn get_all_usage_history(&self) -> Vec<UsageRecord> {
        let history = self.usage_history.read().await;
        history.iter().cloned().collect()
    }

    /// Snapshot of every session's state
    pub async fn snapshot_all(&self) -> Vec<SessionState> {
        let handles: Vec<SessionHandle> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut states = Vec::with_capacity(handles.len());
        for handle in handles {
            states.push(handle.lock().await.clone());
        }
        states
    }

    /// Drop sessions idle for longer than `ttl` that no longer hold quota
    /// within `window`; returns how many were removed
    pub async fn purge_idle(
        &self,
        now: DateTime<Utc>,
        ttl: TimeDelta,
        window: TimeDelta,
    ) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        let mut idle = Vec::new();
        for (id, handle) in sessions.iter() {
            // Handles are only cloned under the map lock, so a count of one
            // means no request is between lookup and commit
            if Arc::strong_count(handle) > 1 {
                continue;
            }
            if let Ok(state) = handle.try_lock() {
                if state.is_idle(now, ttl) && !state.holds_quota(now, window) {
                    idle.push(id.clone());
                }
            }
        }
        for id in &idle {
            sessions.remove(id);
        }

        metrics::ACTIVE_SESSIONS.set(sessions.len() as i64);
        before - sessions.len()
    }

    /// Get session count
    pub async fn count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}
