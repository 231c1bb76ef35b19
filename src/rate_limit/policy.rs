//! Limiter decisions
//!
//! `evaluate` is a pure read of the session state; `commit` records a
//! consumed generation. `check_and_consume` composes the two for callers
//! that want the single-step behaviour.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::config::{RateLimitConfig, RateLimitPolicy};
use super::session::SessionState;

/// Outcome of a limiter check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    /// The generation may proceed
    Allowed,
    /// Quota exhausted; retry after the given number of seconds (always >= 1)
    Denied { seconds_remaining: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// Seconds to wait before retrying, zero when allowed
    pub fn seconds_remaining(&self) -> u64 {
        match self {
            Decision::Allowed => 0,
            Decision::Denied { seconds_remaining } => *seconds_remaining,
        }
    }

    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allowed => "allowed",
            Decision::Denied { .. } => "denied",
        }
    }
}

/// Decide whether a generation would be allowed right now. Never mutates.
pub fn evaluate(state: &SessionState, config: &RateLimitConfig, now: DateTime<Utc>) -> Decision {
    if !config.enabled {
        return Decision::Allowed;
    }

    let window = config.window();
    match config.policy {
        RateLimitPolicy::SlidingWindow => {
            let live: Vec<DateTime<Utc>> = state
                .usage_events
                .iter()
                .copied()
                .filter(|t| in_window(*t, now, window))
                .collect();
            if (live.len() as u64) < config.max_requests as u64 {
                return Decision::Allowed;
            }
            let wait = live.iter().min().map_or(config.window_secs, |oldest| {
                seconds_until(*oldest + window, now, config.window_secs)
            });
            denied(wait)
        }
        RateLimitPolicy::FixedCooldown => match state.blocked_until {
            Some(until) if until > now => {
                denied(seconds_until(until, now, config.window_secs))
            }
            _ => Decision::Allowed,
        },
    }
}

/// Record one consumed generation at `now`.
///
/// Callers are expected to have seen `Decision::Allowed` from `evaluate`.
pub fn commit(state: &mut SessionState, config: &RateLimitConfig, now: DateTime<Utc>) {
    state.last_seen = now;
    if !config.enabled {
        return;
    }

    refresh(state, config, now);
    match config.policy {
        RateLimitPolicy::SlidingWindow => {
            state.usage_events.push_back(now);
        }
        RateLimitPolicy::FixedCooldown => {
            state.counter = state.counter.saturating_add(1);
            if state.counter >= config.max_requests {
                state.blocked_until = Some(now + config.window());
                tracing::info!(
                    session_id = %state.id,
                    counter = state.counter,
                    cooldown_secs = config.window_secs,
                    "Session reached generation limit, cool-down started"
                );
            }
        }
    }
}

/// Housekeeping: drop events outside the window and clear an expired block.
///
/// Clearing a block also resets the counter to zero.
pub fn refresh(state: &mut SessionState, config: &RateLimitConfig, now: DateTime<Utc>) {
    let window = config.window();
    state.usage_events.retain(|t| in_window(*t, now, window));

    if let Some(until) = state.blocked_until {
        if until <= now {
            tracing::debug!(session_id = %state.id, "Cool-down elapsed, session unblocked");
            state.blocked_until = None;
            state.counter = 0;
        }
    }
}

/// Evaluate and, when allowed, commit in one step
pub fn check_and_consume(
    state: &mut SessionState,
    config: &RateLimitConfig,
    now: DateTime<Utc>,
) -> Decision {
    state.last_seen = now;
    if config.enabled {
        refresh(state, config, now);
    }
    let decision = evaluate(state, config, now);
    if decision.is_allowed() {
        commit(state, config, now);
    }
    decision
}

/// Human-readable wait, e.g. "13 minutes" or "1 minute 5 seconds"
pub fn humanize_wait(seconds: u64) -> String {
    fn unit(n: u64, name: &str) -> String {
        if n == 1 {
            format!("1 {}", name)
        } else {
            format!("{} {}s", n, name)
        }
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(unit(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(unit(minutes, "minute"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(unit(secs, "second"));
    }
    parts.join(" ")
}

// Events stamped after `now` (clock stepped back) still count as live.
fn in_window(event: DateTime<Utc>, now: DateTime<Utc>, window: TimeDelta) -> bool {
    now - event < window
}

/// Whole seconds from `now` until `deadline`, rounded up, clamped to `[0, cap]`
fn seconds_until(deadline: DateTime<Utc>, now: DateTime<Utc>, cap: u64) -> u64 {
    let delta = deadline - now;
    if delta <= TimeDelta::zero() {
        return 0;
    }
    let whole = delta.num_seconds();
    let secs = if delta > TimeDelta::seconds(whole) {
        whole + 1
    } else {
        whole
    };
    (secs as u64).min(cap)
}

// Only reached once the quota is known to be exhausted.
fn denied(seconds_remaining: u64) -> Decision {
    Decision::Denied {
        seconds_remaining: seconds_remaining.max(1),
    }
}
