//! Prometheus metrics for leader discovery
//!
//! Tracks refresh cycles, leader changes, watch interruptions, session events
//! and HTTP probes.
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! Until then (or if registration fails) every recording function is a no-op.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};
use std::sync::OnceLock;

struct FinderMetrics {
    refresh_cycles: CounterVec,
    leader_changes: Counter,
    watch_interruptions: CounterVec,
    session_events: CounterVec,
    probe_requests: CounterVec,
    leader_known: Gauge,
}

static FINDER_METRICS: OnceLock<Option<FinderMetrics>> = OnceLock::new();

fn register() -> Result<FinderMetrics, prometheus::Error> {
    Ok(FinderMetrics {
        refresh_cycles: register_counter_vec!(
            "leader_finder_refresh_cycles_total",
            "Refresh cycles by outcome",
            &["outcome"]
        )?,
        leader_changes: register_counter!(
            "leader_finder_leader_changes_total",
            "Number of times a different leader was published"
        )?,
        watch_interruptions: register_counter_vec!(
            "leader_finder_watch_interruptions_total",
            "Watch waits ended, by reason",
            &["reason"]
        )?,
        session_events: register_counter_vec!(
            "leader_finder_session_events_total",
            "Coordination session events by state",
            &["state"]
        )?,
        probe_requests: register_counter_vec!(
            "leader_finder_probe_requests_total",
            "HTTP leader probes by outcome",
            &["outcome"]
        )?,
        leader_known: register_gauge!(
            "leader_finder_leader_known",
            "1 while a cached leader is fresh enough to serve, 0 once it is refused as stale"
        )?,
    })
}

fn metrics() -> Option<&'static FinderMetrics> {
    FINDER_METRICS.get().and_then(Option::as_ref)
}

/// Register all metrics with the default Prometheus registry
///
/// Safe to call more than once; only the first call registers. If that
/// registration fails, metrics stay disabled for the life of the process.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    let mut failure = None;

    FINDER_METRICS.get_or_init(|| match register() {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            tracing::warn!(error = %e, "metrics registration failed, continuing without metrics");
            failure = Some(e);
            None
        }
    });

    match failure {
        Some(e) => Err(Box::new(e)),
        None => Ok(()),
    }
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    metrics().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one refresh cycle (`ok` or an error category)
pub fn record_refresh(outcome: &str) {
    if let Some(m) = metrics() {
        m.refresh_cycles.with_label_values(&[outcome]).inc();
    }
}

/// Record that a new leader was published
pub fn record_leader_change() {
    if let Some(m) = metrics() {
        m.leader_changes.inc();
    }
}

/// Set whether a servable leader is cached
pub fn set_leader_known(known: bool) {
    if let Some(m) = metrics() {
        m.leader_known.set(if known { 1.0 } else { 0.0 });
    }
}

/// Current value of the leader gauge, `None` before `init_metrics()`
pub fn leader_known() -> Option<bool> {
    metrics().map(|m| m.leader_known.get() > 0.0)
}

/// Record why a watch wait ended
pub fn record_watch_interruption(reason: &str) {
    if let Some(m) = metrics() {
        m.watch_interruptions.with_label_values(&[reason]).inc();
    }
}

/// Record a session state transition
pub fn record_session_event(state: &str) {
    if let Some(m) = metrics() {
        m.session_events.with_label_values(&[state]).inc();
    }
}

/// Record an HTTP probe (`redirect`, `direct` or `error`)
pub fn record_probe(outcome: &str) {
    if let Some(m) = metrics() {
        m.probe_requests.with_label_values(&[outcome]).inc();
    }
}
