// Rate Limiter Benchmarks
//
// Key paths measured:
// - Pure policy evaluation on a single session state (both policies)
// - check_and_consume through the shared limiter, one hot session
// - check_and_consume across many distinct sessions
//
// Usage:
//   cargo bench --bench rate_limit

use chrono::{DateTime, TimeDelta, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use promptgate::rate_limit::policy;
use promptgate::rate_limit::{RateLimitConfig, RateLimiter, SessionId, SessionState};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

fn bench_policy_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_evaluate");

    let configs = [
        (
            "sliding_window",
            RateLimitConfig::sliding_window(100, Duration::from_secs(900)),
        ),
        (
            "fixed_cooldown",
            RateLimitConfig::fixed_cooldown(100, Duration::from_secs(900)),
        ),
    ];

    for (name, config) in configs {
        let mut state = SessionState::new(SessionId::new("bench"), t0());
        for i in 0..50 {
            policy::check_and_consume(&mut state, &config, t0() + TimeDelta::seconds(i));
        }
        let now = t0() + TimeDelta::seconds(60);

        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| policy::evaluate(black_box(&state), black_box(&config), black_box(now)))
        });
    }

    group.finish();
}

fn bench_limiter_hot_session(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let limiter = RateLimiter::new(RateLimitConfig::sliding_window(
        2,
        Duration::from_secs(900),
    ));
    let session = SessionId::new("hot");

    c.bench_function("limiter_check_and_consume_hot", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(limiter.check_and_consume(&session, Utc::now()).await);
            })
        })
    });
}

fn bench_limiter_many_sessions(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("limiter_many_sessions");

    for count in [10usize, 100, 1000] {
        let sessions: Vec<SessionId> = (0..count)
            .map(|i| SessionId::new(format!("session-{}", i)))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &sessions, |b, sessions| {
            b.iter(|| {
                rt.block_on(async {
                    let limiter = RateLimiter::default_config();
                    let now = t0();
                    for session in sessions {
                        black_box(limiter.check_and_consume(session, now).await);
                    }
                })
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_policy_evaluate,
    bench_limiter_hot_session,
    bench_limiter_many_sessions
);
criterion_main!(benches);
