use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::delivery::DeliveryEngine;
use crate::postgres::PostgresPool;
use crate::provider::PushProvider;
use crate::storage::Stores;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub stores: Stores,
    pub provider: Arc<dyn PushProvider>,
    pub engine: Arc<DeliveryEngine>,
    pub postgres_pool: Option<PostgresPool>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        stores: Stores,
        provider: Arc<dyn PushProvider>,
        postgres_pool: Option<PostgresPool>,
    ) -> Self {
        let engine = Arc::new(DeliveryEngine::new(
            stores.registrations.clone(),
            stores.notifications.clone(),
            provider.clone(),
            settings.delivery.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            stores,
            provider,
            engine,
            postgres_pool,
            start_time: Instant::now(),
        }
    }

    /// In-memory stores with the given provider, used by tests and local runs
    pub fn in_memory(settings: Settings, provider: Arc<dyn PushProvider>) -> Self {
        Self::new(settings, Stores::memory(), provider, None)
    }
}
