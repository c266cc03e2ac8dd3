//! Fan-out delivery engine.
//!
//! Resolves the target devices of a notification, sends one message per
//! device through the configured [`PushProvider`](crate::provider::PushProvider),
//! classifies each result, applies side effects (deactivating unregistered
//! tokens), writes one delivery log per device and finalizes the aggregate
//! counters once.

mod classifier;
mod engine;
mod message;

pub use classifier::{DeliveryOutcome, SideEffect, UNREGISTERED_DETAIL};
pub use engine::{
    DeliveryEngine, DispatchError, DispatchRequest, DispatchResult, EngineStats,
    EngineStatsSnapshot, ProbeResult,
};
pub use message::{OutboundTemplate, NOTIFICATION_ID_KEY, TIMESTAMP_KEY};
