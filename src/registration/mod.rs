//! Device registration store.
//!
//! Registrations are the endpoints a notification fans out to. Two backends
//! implement [`RegistrationStore`]:
//!
//! - `MemoryRegistrationStore`: DashMap-backed, lost on restart
//! - `PostgresRegistrationStore`: `device_registrations` table

pub mod backend;
pub mod memory_backend;
pub mod postgres_backend;
mod types;

pub use backend::RegistrationStore;
pub use memory_backend::MemoryRegistrationStore;
pub use postgres_backend::PostgresRegistrationStore;
pub use types::{DeviceRegistration, DeviceType};
