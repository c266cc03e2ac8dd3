//! Backend trait for notification records and delivery logs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::storage::StoreError;

use super::types::{DeliveryLogEntry, DeliverySummary, NewDeliveryLog, NewNotification, Notification};

/// Persistence for notifications and their per-device delivery log.
///
/// # Invariants
///
/// - `finalize_notification` succeeds at most once per notification; a second
///   call returns `StoreError::AlreadyFinalized`.
/// - At most one log entry exists per (notification, registration) pair; a
///   duplicate append returns `StoreError::Duplicate`.
/// - Log entries are never modified after `append_log`.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new notification with zero counters.
    async fn create_notification(&self, new: NewNotification) -> Result<Notification, StoreError>;

    /// Write the final counters of a notification in one step.
    async fn finalize_notification(
        &self,
        id: Uuid,
        summary: DeliverySummary,
    ) -> Result<Notification, StoreError>;

    /// Append one delivery attempt record.
    async fn append_log(&self, entry: NewDeliveryLog) -> Result<DeliveryLogEntry, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Most recent notifications, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Notification>, StoreError>;

    /// Delivery log of one notification, oldest first.
    async fn logs_for(&self, notification_id: Uuid) -> Result<Vec<DeliveryLogEntry>, StoreError>;

    /// Backend identifier for logging and stats
    fn backend_type(&self) -> &'static str;
}
