//! Property-Based Tests for the Rate Limiter
//!
//! Random call sequences in simulated time, checked against the limiter's
//! invariants for both policies.
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib rate_limit::proptests
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use proptest::prelude::*;
use std::time::Duration;

use crate::rate_limit::config::{RateLimitConfig, RateLimitPolicy};
use crate::rate_limit::policy::{check_and_consume, evaluate, Decision};
use crate::rate_limit::session::{SessionId, SessionState};

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn arb_policy() -> impl Strategy<Value = RateLimitPolicy> {
    prop_oneof![
        Just(RateLimitPolicy::SlidingWindow),
        Just(RateLimitPolicy::FixedCooldown),
    ]
}

fn arb_config() -> impl Strategy<Value = RateLimitConfig> {
    (arb_policy(), 1u32..6, 1u64..600).prop_map(|(policy, max_requests, window_secs)| {
        RateLimitConfig {
            enabled: true,
            policy,
            max_requests,
            window_secs,
        }
    })
}

// Non-decreasing call times built from random gaps, in milliseconds
fn arb_call_times() -> impl Strategy<Value = Vec<DateTime<Utc>>> {
    prop::collection::vec(0i64..120_000, 1..60).prop_map(|gaps| {
        let mut at = t0();
        gaps.into_iter()
            .map(|gap| {
                at += TimeDelta::milliseconds(gap);
                at
            })
            .collect()
    })
}

fn run(config: &RateLimitConfig, times: &[DateTime<Utc>]) -> Vec<(DateTime<Utc>, Decision)> {
    let mut state = SessionState::new(SessionId::new("prop"), t0());
    times
        .iter()
        .map(|now| (*now, check_and_consume(&mut state, config, *now)))
        .collect()
}

// ============================================================================
// Property 1: Allowed calls inside any rolling window never exceed the limit
// ============================================================================

proptest! {
    #[test]
    fn prop_allowed_within_window_never_exceeds_max(
        config in arb_config(),
        times in arb_call_times()
    ) {
        let window = config.window();
        let allowed: Vec<DateTime<Utc>> = run(&config, &times)
            .into_iter()
            .filter(|(_, d)| d.is_allowed())
            .map(|(t, _)| t)
            .collect();

        for start in &allowed {
            let in_window = allowed
                .iter()
                .filter(|t| **t >= *start && **t - *start < window)
                .count();
            prop_assert!(
                in_window as u32 <= config.max_requests,
                "{} allowed calls within one window (limit {})",
                in_window,
                config.max_requests
            );
        }
    }

    /// Every denial carries a positive wait no longer than the window
    #[test]
    fn prop_denials_carry_bounded_positive_wait(
        config in arb_config(),
        times in arb_call_times()
    ) {
        for (_, decision) in run(&config, &times) {
            if let Decision::Denied { seconds_remaining } = decision {
                prop_assert!(seconds_remaining > 0);
                prop_assert!(seconds_remaining <= config.window_secs);
            }
        }
    }
}

// ============================================================================
// Property 2: Exhaustion, countdown and recovery
// ============================================================================

proptest! {
    /// `max_requests` back-to-back calls are allowed, the next one is denied,
    /// the wait shrinks as time advances, and the deadline restores access.
    #[test]
    fn prop_exhaust_countdown_recover(
        policy in arb_policy(),
        max_requests in 1u32..6,
        window_secs in 2u64..600,
        steps in prop::collection::vec(1i64..5_000, 1..20)
    ) {
        let config = RateLimitConfig { enabled: true, policy, max_requests, window_secs };
        let mut state = SessionState::new(SessionId::new("prop"), t0());

        for _ in 0..max_requests {
            prop_assert_eq!(check_and_consume(&mut state, &config, t0()), Decision::Allowed);
        }

        let first = check_and_consume(&mut state, &config, t0());
        prop_assert!(!first.is_allowed());

        let deadline = t0() + config.window();
        let mut previous = first.seconds_remaining();
        let mut now = t0();
        for step in steps {
            now += TimeDelta::milliseconds(step);
            if now >= deadline {
                break;
            }
            let remaining = evaluate(&state, &config, now).seconds_remaining();
            prop_assert!(remaining <= previous);
            previous = remaining;
        }

        prop_assert!(check_and_consume(&mut state, &config, deadline).is_allowed());
    }

    /// A dry-run evaluation never changes the state
    #[test]
    fn prop_evaluate_is_pure(
        config in arb_config(),
        times in arb_call_times(),
        probe_offset in 0i64..1_200_000
    ) {
        let mut state = SessionState::new(SessionId::new("prop"), t0());
        for now in &times {
            check_and_consume(&mut state, &config, *now);
        }

        let before = state.clone();
        let _ = evaluate(&state, &config, t0() + TimeDelta::milliseconds(probe_offset));
        prop_assert_eq!(state, before);
    }

    /// Interleaved sessions see exactly what they would see alone
    #[test]
    fn prop_sessions_are_independent(
        config in arb_config(),
        times_a in arb_call_times(),
        times_b in arb_call_times()
    ) {
        let alone_a = run(&config, &times_a);

        let mut a = SessionState::new(SessionId::new("a"), t0());
        let mut b = SessionState::new(SessionId::new("b"), t0());
        let mut interleaved = Vec::new();
        for (i, now) in times_a.iter().enumerate() {
            if let Some(other) = times_b.get(i) {
                check_and_consume(&mut b, &config, *other);
            }
            interleaved.push((*now, check_and_consume(&mut a, &config, *now)));
        }

        prop_assert_eq!(alone_a, interleaved);
    }
}

#[test]
fn test_fixed_window_config_is_honoured() {
    let config = RateLimitConfig::fixed_cooldown(5, Duration::from_secs(900));
    let times: Vec<DateTime<Utc>> = (0..7).map(|i| t0() + TimeDelta::seconds(i)).collect();
    let decisions = run(&config, &times);

    assert!(decisions[..5].iter().all(|(_, d)| d.is_allowed()));
    assert_eq!(decisions[5].1, Decision::Denied { seconds_remaining: 899 });
}
