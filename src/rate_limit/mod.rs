//! Per-Session Rate Limiting
//!
//! This module decides, at the moment of a generation request, whether the
//! request may proceed for a given session, and records the usage.
//!
//! # Policies
//!
//! - **Sliding window**: at most `max_requests` generations inside any
//!   trailing `window_secs` interval
//! - **Fixed cool-down**: after `max_requests` generations the session is
//!   blocked for `window_secs`; the counter starts over once the block clears
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RateLimiter                          │
//! │   check_and_consume(session, now) / evaluate / unblock      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  policy: evaluate (pure)  ──►  commit (mutating)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │   SessionStore: SessionId ─► Mutex<SessionState>     │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod manager;
pub mod policy;
pub mod session;
pub mod store;

#[cfg(test)]
mod proptests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RateLimitConfig, RateLimitPolicy};
pub use dashboard::{AdminAction, AdminOutcome, DashboardBuilder, DashboardData};
pub use manager::{RateLimiter, SessionUsage};
pub use policy::{humanize_wait, Decision};
pub use session::{SessionId, SessionState};
pub use store::{SessionStore, UsageRecord};
