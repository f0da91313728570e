//! Prometheus metrics for the feedrelay pipeline
//!
//! This module provides metrics tracking for:
//! - Scheduler: cycle duration and failed cycles per task
//! - Fetchers: fetch errors per platform and failure class, login outcomes
//! - Pipeline: dedup new/seen counts, deliveries per outcome, purged records
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all relay metrics
struct RelayMetrics {
    cycle_duration: HistogramVec,
    cycle_failures: CounterVec,
    fetch_errors: CounterVec,
    logins: CounterVec,
    dedup_new: CounterVec,
    dedup_seen: CounterVec,
    deliveries: CounterVec,
    purged_records: Counter,
}

/// Global storage for relay metrics
static RELAY_METRICS: OnceLock<RelayMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged by the caller and
/// subsequent metric operations become no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = RelayMetrics {
        cycle_duration: register_histogram_vec!(
            "feedrelay_cycle_duration_seconds",
            "Time spent running one cycle of a scheduled task",
            &["task"],
            vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
        )?,
        cycle_failures: register_counter_vec!(
            "feedrelay_cycle_failures_total",
            "Cycles that returned an error or panicked",
            &["task"]
        )?,
        fetch_errors: register_counter_vec!(
            "feedrelay_fetch_errors_total",
            "Fetch failures by platform and failure class",
            &["platform", "kind"]
        )?,
        logins: register_counter_vec!(
            "feedrelay_logins_total",
            "Login attempts by platform and outcome",
            &["platform", "outcome"]
        )?,
        dedup_new: register_counter_vec!(
            "feedrelay_dedup_new_total",
            "Fetched items not seen before",
            &["platform"]
        )?,
        dedup_seen: register_counter_vec!(
            "feedrelay_dedup_seen_total",
            "Fetched items already recorded",
            &["platform"]
        )?,
        deliveries: register_counter_vec!(
            "feedrelay_deliveries_total",
            "Per-subscription delivery outcomes",
            &["platform", "outcome"]
        )?,
        purged_records: register_counter!(
            "feedrelay_purged_records_total",
            "Expired seen records removed by cleanup"
        )?,
    };

    RELAY_METRICS
        .set(metrics)
        .map_err(|_| "Relay metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    RELAY_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a cycle timer for a scheduled task
pub fn start_cycle_timer(task: &str) -> MetricsTimer {
    match RELAY_METRICS.get() {
        Some(m) => MetricsTimer::new(m.cycle_duration.with_label_values(&[task]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

/// Record a cycle that errored or panicked
pub fn record_cycle_failure(task: &str) {
    if let Some(m) = RELAY_METRICS.get() {
        m.cycle_failures.with_label_values(&[task]).inc();
    }
}

/// Record a fetch failure
pub fn record_fetch_error(platform: &str, kind: &str) {
    if let Some(m) = RELAY_METRICS.get() {
        m.fetch_errors.with_label_values(&[platform, kind]).inc();
    }
}

/// Record a login attempt
pub fn record_login(platform: &str, success: bool) {
    if let Some(m) = RELAY_METRICS.get() {
        let outcome = if success { "success" } else { "failure" };
        m.logins.with_label_values(&[platform, outcome]).inc();
    }
}

/// Record deduplication results
pub fn record_dedup_results(platform: &str, new_items: usize, seen_items: usize) {
    let Some(m) = RELAY_METRICS.get() else {
        return;
    };

    if new_items > 0 {
        m.dedup_new
            .with_label_values(&[platform])
            .inc_by(new_items as f64);
    }
    if seen_items > 0 {
        m.dedup_seen
            .with_label_values(&[platform])
            .inc_by(seen_items as f64);
    }
}

/// Record dispatch results for one item
pub fn record_dispatch_results(
    platform: &str,
    delivered: usize,
    filtered: usize,
    unresolved: usize,
    failed: usize,
) {
    let Some(m) = RELAY_METRICS.get() else {
        return;
    };

    for (outcome, count) in [
        ("delivered", delivered),
        ("filtered", filtered),
        ("unresolved", unresolved),
        ("failed", failed),
    ] {
        if count > 0 {
            m.deliveries
                .with_label_values(&[platform, outcome])
                .inc_by(count as f64);
        }
    }
}

/// Record records removed by cleanup
pub fn record_purged(count: usize) {
    if let Some(m) = RELAY_METRICS.get() {
        m.purged_records.inc_by(count as f64);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        let result = init_metrics();
        assert!(result.is_ok());

        // Second call should also be Ok (idempotent)
        let result2 = init_metrics();
        assert!(result2.is_ok());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_login("instagram", true);
        let text = encode_metrics().unwrap();
        assert!(text.contains("feedrelay_") || text.is_empty());
    }

    #[test]
    fn test_pipeline_metrics() {
        ensure_metrics_initialized();
        record_fetch_error("vlive", "transport");
        record_dedup_results("instagram", 3, 17);
        record_dispatch_results("instagram", 2, 1, 1, 0);
        record_purged(4);
        record_cycle_failure("story-cleanup");
    }

    #[test]
    fn test_cycle_timer() {
        ensure_metrics_initialized();
        let _timer = start_cycle_timer("vlive-poll");
    }

    #[test]
    fn test_metrics_noop_without_init() {
        // These should not panic even if called before initialization
        record_fetch_error("test", "test");
        record_login("test", false);
        record_dedup_results("test", 1, 1);
        record_dispatch_results("test", 1, 0, 0, 0);
        record_purged(1);
        let _timer = start_cycle_timer("test");
    }
}
