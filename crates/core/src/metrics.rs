//! Metrics definitions for the indexer.
//!
//! This module defines all metrics used throughout the indexer.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "events_applied_total",
        "Total number of contract events applied to the projection"
    );
    describe_counter!(
        "events_skipped_total",
        "Total number of duplicate events skipped via cursor comparison"
    );
    describe_counter!(
        "apply_retries_total",
        "Total number of transient storage retries during event application"
    );
    describe_counter!(
        "consistency_errors_total",
        "Total number of fatal consistency errors (rental without listing)"
    );
    describe_counter!(
        "decode_errors_total",
        "Total number of log decode errors during event extraction"
    );
    describe_histogram!(
        "event_apply_duration_seconds",
        "Time taken to apply one event in seconds"
    );
}

/// Record a successfully applied event.
///
/// # Arguments
/// * `kind` - The event kind ("listed", "rented" or "reclaimed")
pub fn record_event_applied(kind: &str) {
    counter!("events_applied_total", "kind" => kind.to_string()).increment(1);
}

/// Record a duplicate event skipped via the cursor.
pub fn record_event_skipped() {
    counter!("events_skipped_total").increment(1);
}

/// Record a transient storage retry.
pub fn record_apply_retry() {
    counter!("apply_retries_total").increment(1);
}

/// Record a fatal consistency error.
pub fn record_consistency_error() {
    counter!("consistency_errors_total").increment(1);
}

/// Record a log decode error.
///
/// # Arguments
/// * `at_block` - The block number of the undecodable log
pub fn record_decode_error(at_block: u64) {
    counter!("decode_errors_total", "at_block" => at_block.to_string()).increment(1);
}

/// Record event application duration.
pub fn record_apply_duration(duration_secs: f64) {
    histogram!("event_apply_duration_seconds").record(duration_secs);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_apply_duration(duration);
    }
}
