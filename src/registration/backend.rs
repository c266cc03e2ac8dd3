//! Backend trait for device registration storage.

use async_trait::async_trait;
use uuid::Uuid;

use crate::storage::StoreError;

use super::types::{DeviceRegistration, DeviceType};

/// Storage for device registrations.
///
/// The delivery engine only reads snapshots through [`list_active`] and flips
/// registrations inactive through [`deactivate`]; registration and listing are
/// used by the HTTP layer.
///
/// [`list_active`]: RegistrationStore::list_active
/// [`deactivate`]: RegistrationStore::deactivate
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Register a token, or return the existing registration for it.
    ///
    /// An existing inactive registration is reactivated. Owner and device type
    /// of an existing registration are left untouched.
    ///
    /// Returns the registration and whether it was newly created.
    async fn register(
        &self,
        token: &str,
        owner_id: Option<&str>,
        device_type: DeviceType,
    ) -> Result<(DeviceRegistration, bool), StoreError>;

    /// Snapshot of active registrations, optionally restricted to owners.
    ///
    /// The returned vector is owned and never observes later mutations.
    async fn list_active(
        &self,
        owner_ids: Option<&[String]>,
    ) -> Result<Vec<DeviceRegistration>, StoreError>;

    /// Mark a registration inactive.
    ///
    /// Returns `true` if this call flipped the flag. Deactivating an already
    /// inactive or unknown registration returns `false` and is not an error.
    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError>;

    /// All registrations, newest first.
    async fn list(&self) -> Result<Vec<DeviceRegistration>, StoreError>;

    /// Backend identifier for logging and stats
    fn backend_type(&self) -> &'static str;
}
