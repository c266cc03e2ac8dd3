//! Storage backends shared by the registration and notification stores.
//!
//! Use [`create_stores`] to build both stores for the configured backend:
//!
//! - `"postgres"`: PostgreSQL tables, requires a pool
//! - `"memory"` (default): DashMap-backed, lost on restart

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::notification::{MemoryNotificationStore, NotificationStore, PostgresNotificationStore};
use crate::postgres::PostgresPool;
use crate::registration::{MemoryRegistrationStore, PostgresRegistrationStore, RegistrationStore};

/// Errors returned by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Caller supplied an unusable value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Write would violate a uniqueness rule
    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Notification {0} is already finalized")]
    AlreadyFinalized(Uuid),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),
}

/// The pair of stores the service runs on
#[derive(Clone)]
pub struct Stores {
    pub registrations: Arc<dyn RegistrationStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    /// In-memory stores
    pub fn memory() -> Self {
        Self {
            registrations: Arc::new(MemoryRegistrationStore::new()),
            notifications: Arc::new(MemoryNotificationStore::new()),
        }
    }
}

/// Create the stores for the configured backend.
///
/// Falls back to memory when `"postgres"` is requested without a pool.
pub fn create_stores(settings: &StorageConfig, postgres_pool: Option<&PostgresPool>) -> Stores {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL stores");
                Stores {
                    registrations: Arc::new(PostgresRegistrationStore::new(pool.pool().clone())),
                    notifications: Arc::new(PostgresNotificationStore::new(pool.pool().clone())),
                }
            } else {
                tracing::warn!(
                    "PostgreSQL storage requested but no pool provided, falling back to memory"
                );
                Stores::memory()
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory stores");
            Stores::memory()
        }
    }
}
