//! In-memory registration store using DashMap.
//!
//! Registrations are lost on restart. Intended for development and tests.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::storage::StoreError;

use super::backend::RegistrationStore;
use super::types::{DeviceRegistration, DeviceType};

/// In-memory registration store.
///
/// `registrations` is the primary map; `by_token` enforces token uniqueness and
/// serializes concurrent registrations of the same token through its entry lock.
#[derive(Default)]
pub struct MemoryRegistrationStore {
    registrations: DashMap<Uuid, DeviceRegistration>,
    by_token: DashMap<String, Uuid>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored registrations (active or not)
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Look up a registration by id
    pub fn get(&self, id: Uuid) -> Option<DeviceRegistration> {
        self.registrations.get(&id).map(|r| r.clone())
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn register(
        &self,
        token: &str,
        owner_id: Option<&str>,
        device_type: DeviceType,
    ) -> Result<(DeviceRegistration, bool), StoreError> {
        if token.trim().is_empty() {
            return Err(StoreError::InvalidInput("token is required".to_string()));
        }

        match self.by_token.entry(token.to_string()) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                let mut registration = self
                    .registrations
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("registration {}", id)))?;

                if !registration.active {
                    registration.active = true;
                    tracing::info!(registration_id = %id, "Reactivated device registration");
                }

                Ok((registration.clone(), false))
            }
            Entry::Vacant(entry) => {
                let registration =
                    DeviceRegistration::new(token, owner_id.map(str::to_string), device_type);
                entry.insert(registration.id);
                self.registrations.insert(registration.id, registration.clone());

                tracing::debug!(
                    registration_id = %registration.id,
                    device_type = registration.device_type.as_str(),
                    "Device registered"
                );

                Ok((registration, true))
            }
        }
    }

    async fn list_active(
        &self,
        owner_ids: Option<&[String]>,
    ) -> Result<Vec<DeviceRegistration>, StoreError> {
        let mut active: Vec<DeviceRegistration> = self
            .registrations
            .iter()
            .filter(|r| r.matches(owner_ids))
            .map(|r| r.value().clone())
            .collect();

        active.sort_by_key(|r| r.created_at);
        Ok(active)
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError> {
        match self.registrations.get_mut(&id) {
            Some(mut registration) => {
                let was_active = registration.active;
                registration.active = false;
                Ok(was_active)
            }
            None => {
                tracing::debug!(registration_id = %id, "Deactivate requested for unknown registration");
                Ok(false)
            }
        }
    }

    async fn list(&self) -> Result<Vec<DeviceRegistration>, StoreError> {
        let mut all: Vec<DeviceRegistration> =
            self.registrations.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
