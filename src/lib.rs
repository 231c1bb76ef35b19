//! PromptGate Library
//!
//! Session-scoped rate limiting in front of a hosted text generation API,
//! with an optional web search for published text overlapping the response.

pub mod config;
pub mod error;
pub mod generation;
pub mod metrics;
pub mod rate_limit;
pub mod search;
pub mod server;
pub mod service;
