//! Prometheus metrics for the push dispatch service.
//!
//! - Dispatch metrics (accepted, rejected, fan-out size and duration)
//! - Per-device delivery outcomes and registration deactivations
//! - Provider call latency
//! - Single-token probes

mod helpers;

pub use helpers::{encode_metrics, DeliveryMetrics, DispatchMetrics, ProbeMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_push";

lazy_static! {
    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Dispatch requests that reached fan-out, by target mode
    pub static ref DISPATCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatches_total", METRIC_PREFIX),
        "Total dispatch requests that reached fan-out",
        &["target"]
    ).unwrap();

    /// Dispatch requests rejected before fan-out, by reason
    pub static ref DISPATCHES_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatches_rejected_total", METRIC_PREFIX),
        "Total dispatch requests rejected before any delivery attempt",
        &["reason"]
    ).unwrap();

    /// Fan-outs aborted by a storage failure
    pub static ref DISPATCHES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_dispatches_failed_total", METRIC_PREFIX),
        "Total fan-outs that could not be finalized because of a storage error"
    ).unwrap();

    /// Devices targeted per fan-out
    pub static ref FANOUT_SIZE: Histogram = register_histogram!(
        format!("{}_fanout_size", METRIC_PREFIX),
        "Distribution of devices targeted per notification",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    ).unwrap();

    /// Wall-clock duration of a full fan-out
    pub static ref FANOUT_DURATION: Histogram = register_histogram!(
        format!("{}_fanout_duration_seconds", METRIC_PREFIX),
        "Fan-out duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Per-device delivery outcomes
    pub static ref DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Total per-device delivery attempts by outcome",
        &["outcome"]
    ).unwrap();

    /// Registrations deactivated after an unregistered response
    pub static ref DEACTIVATIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_registrations_deactivated_total", METRIC_PREFIX),
        "Total registrations deactivated because the provider reported them unregistered"
    ).unwrap();

    /// Provider call latency
    pub static ref PROVIDER_LATENCY: Histogram = register_histogram!(
        format!("{}_provider_latency_seconds", METRIC_PREFIX),
        "Push provider call latency in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    // ============================================================================
    // Probe Metrics
    // ============================================================================

    /// Single-token probes by outcome
    pub static ref PROBES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_probes_total", METRIC_PREFIX),
        "Total single-token probes by outcome",
        &["outcome"]
    ).unwrap();
}
