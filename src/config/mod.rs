mod settings;

pub use settings::{
    DatabaseConfig, DeliveryConfig, FcmConfig, OtelConfig, ProviderConfig, ServerConfig, Settings,
    StorageConfig,
};
