// Prometheus metrics for the PromptGate service
//
// Exposes metrics on /metrics HTTP endpoint:
// - Rate limit decisions by policy and outcome (counter)
// - Tracked sessions (gauge)
// - Generation requests and latencies (counter, histogram)
// - Search requests (counter)

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Rate limit metrics
    pub static ref RATE_LIMIT_DECISIONS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("rate_limit_decisions_total", "Rate limit decisions by policy and outcome"),
        &["policy", "outcome"]
    ).expect("Failed to create rate limit decisions metric");

    pub static ref ACTIVE_SESSIONS: IntGauge = IntGauge::new(
        "active_sessions",
        "Number of sessions currently tracked by the limiter"
    ).expect("Failed to create active sessions metric");

    pub static ref SESSIONS_PURGED_TOTAL: IntCounter = IntCounter::new(
        "sessions_purged_total",
        "Total number of idle sessions dropped"
    ).expect("Failed to create sessions purged metric");

    // Generation metrics
    pub static ref GENERATION_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("generation_requests_total", "Total number of generation backend calls"),
        &["backend", "status"]
    ).expect("Failed to create generation requests metric");

    pub static ref GENERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("generation_duration_seconds", "Generation backend latency in seconds"),
        &["backend"]
    ).expect("Failed to create generation duration metric");

    // Search metrics
    pub static ref SEARCH_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("search_requests_total", "Total number of web search calls"),
        &["status"]
    ).expect("Failed to create search requests metric");
}

/// Initialize metrics registry
///
/// Safe to call more than once; collectors that are already registered are
/// left in place.
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(RATE_LIMIT_DECISIONS_TOTAL.clone()),
        Box::new(ACTIVE_SESSIONS.clone()),
        Box::new(SESSIONS_PURGED_TOTAL.clone()),
        Box::new(GENERATION_REQUESTS_TOTAL.clone()),
        Box::new(GENERATION_DURATION_SECONDS.clone()),
        Box::new(SEARCH_REQUESTS_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_decision_metrics_are_exported() {
        init().unwrap();
        RATE_LIMIT_DECISIONS_TOTAL
            .with_label_values(&["sliding_window", "allowed"])
            .inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("rate_limit_decisions_total"));
        assert!(text.contains("policy=\"sliding_window\""));
    }

    #[test]
    fn test_session_gauge_is_registered() {
        init().unwrap();
        let text = gather_metrics().unwrap();
        assert!(text.contains("active_sessions"));
    }
}
