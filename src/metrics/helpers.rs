//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::delivery::DeliveryOutcome;
use crate::notification::TargetMode;

use super::{
    DEACTIVATIONS_TOTAL, DELIVERIES_TOTAL, DISPATCHES_FAILED_TOTAL, DISPATCHES_REJECTED_TOTAL,
    DISPATCHES_TOTAL, FANOUT_DURATION, FANOUT_SIZE, PROBES_TOTAL, PROVIDER_LATENCY,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a dispatch that reached fan-out
    pub fn record_started(target: &TargetMode, devices: usize) {
        let label = if target.is_all() { "all" } else { "owners" };
        DISPATCHES_TOTAL.with_label_values(&[label]).inc();
        FANOUT_SIZE.observe(devices as f64);
    }

    /// Record a request rejected by validation
    pub fn record_invalid() {
        DISPATCHES_REJECTED_TOTAL
            .with_label_values(&["validation"])
            .inc();
    }

    /// Record a request that resolved to no devices
    pub fn record_no_targets() {
        DISPATCHES_REJECTED_TOTAL
            .with_label_values(&["no_targets"])
            .inc();
    }

    /// Record a fan-out aborted by a storage error
    pub fn record_failed() {
        DISPATCHES_FAILED_TOTAL.inc();
    }

    /// Record a completed fan-out
    pub fn record_completed(elapsed: Duration) {
        FANOUT_DURATION.observe(elapsed.as_secs_f64());
    }
}

/// Helper struct for recording per-device delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record one classified delivery attempt
    pub fn record_outcome(outcome: &DeliveryOutcome) {
        DELIVERIES_TOTAL.with_label_values(&[outcome.label()]).inc();
    }

    /// Record a registration flipped to inactive
    pub fn record_deactivated() {
        DEACTIVATIONS_TOTAL.inc();
    }

    /// Record provider call latency
    pub fn observe_provider_latency(elapsed: Duration) {
        PROVIDER_LATENCY.observe(elapsed.as_secs_f64());
    }
}

/// Helper struct for recording probe metrics
pub struct ProbeMetrics;

impl ProbeMetrics {
    pub fn record(outcome: &DeliveryOutcome) {
        PROBES_TOTAL.with_label_values(&[outcome.label()]).inc();
    }
}
