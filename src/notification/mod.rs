//! Notification records and the per-device delivery log.
//!
//! A [`Notification`] is created with zero counters before fan-out and
//! finalized exactly once afterwards. Every targeted device gets exactly one
//! [`DeliveryLogEntry`].

pub mod backend;
pub mod memory_backend;
pub mod postgres_backend;
mod types;

pub use backend::NotificationStore;
pub use memory_backend::MemoryNotificationStore;
pub use postgres_backend::PostgresNotificationStore;
pub use types::{
    DeliveryLogEntry, DeliveryStatus, DeliverySummary, FailureKind, NewDeliveryLog,
    NewNotification, Notification, Payload, TargetMode,
};
