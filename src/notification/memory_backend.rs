//! In-memory notification store using DashMap.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::storage::StoreError;

use super::backend::NotificationStore;
use super::types::{DeliveryLogEntry, DeliverySummary, NewDeliveryLog, NewNotification, Notification};

/// In-memory notification store.
///
/// Logs are keyed by (notification, registration) so a second append for the
/// same pair is rejected.
#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: DashMap<Uuid, Notification>,
    logs: DashMap<(Uuid, Uuid), DeliveryLogEntry>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of log entries across all notifications
    pub fn log_count(&self) -> usize {
        self.logs.len()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create_notification(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let notification = Notification::new(new);
        self.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn finalize_notification(
        &self,
        id: Uuid,
        summary: DeliverySummary,
    ) -> Result<Notification, StoreError> {
        let mut notification = self
            .notifications
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("notification {}", id)))?;

        if !notification.finalize(summary) {
            return Err(StoreError::AlreadyFinalized(id));
        }

        Ok(notification.clone())
    }

    async fn append_log(&self, entry: NewDeliveryLog) -> Result<DeliveryLogEntry, StoreError> {
        if !self.notifications.contains_key(&entry.notification_id) {
            return Err(StoreError::NotFound(format!(
                "notification {}",
                entry.notification_id
            )));
        }

        match self.logs.entry((entry.notification_id, entry.registration_id)) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "delivery log for notification {} and registration {}",
                entry.notification_id, entry.registration_id
            ))),
            Entry::Vacant(slot) => {
                let log = DeliveryLogEntry::new(entry);
                slot.insert(log.clone());
                Ok(log)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.notifications.get(&id).map(|n| n.clone()))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let mut all: Vec<Notification> =
            self.notifications.iter().map(|n| n.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn logs_for(&self, notification_id: Uuid) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        let mut logs: Vec<DeliveryLogEntry> = self
            .logs
            .iter()
            .filter(|e| e.key().0 == notification_id)
            .map(|e| e.value().clone())
            .collect();
        logs.sort_by_key(|l| l.created_at);
        Ok(logs)
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
