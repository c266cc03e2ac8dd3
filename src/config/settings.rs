use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

/// Where registrations, notifications and delivery logs live
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// "memory" (default) or "postgres"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
    /// Apply embedded migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// "fcm" or "noop" (default)
    #[serde(default = "default_provider_backend")]
    pub backend: String,
    #[serde(default)]
    pub fcm: FcmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmConfig {
    /// Project the messages are sent under. Taken from the service account
    /// file when not set.
    pub project_id: Option<String>,
    /// Path to a service account JSON key
    pub credentials_path: Option<String>,
    /// Static bearer token, used instead of a service account (emulators)
    pub access_token: Option<String>,
    #[serde(default = "default_fcm_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Upper bound on in-flight provider calls during one fan-out
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Title used by the single-token probe
    #[serde(default = "default_probe_title")]
    pub probe_title: String,
    /// Body used by the single-token probe
    #[serde(default = "default_probe_body")]
    pub probe_body: String,
    /// Number of notifications returned by the history listing
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
    /// Emit log lines as JSON instead of human-readable text
    #[serde(default)]
    pub json_logs: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_body_limit() -> usize {
    64 * 1024
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost:5432/ara_push".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    600 // 10 minutes
}

fn default_true() -> bool {
    true
}

fn default_provider_backend() -> String {
    "noop".to_string()
}

fn default_fcm_base_url() -> String {
    "https://fcm.googleapis.com".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_concurrency() -> usize {
    16
}

fn default_probe_title() -> String {
    "Test Notification".to_string()
}

fn default_probe_body() -> String {
    "This is a test message - token is working!".to_string()
}

fn default_history_limit() -> usize {
    20
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "ara-push-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("storage.backend", "memory")?
            .set_default("provider.backend", "noop")?
            .set_default("delivery.max_concurrency", 16)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, STORAGE__BACKEND, PROVIDER__FCM__PROJECT_ID, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            provider: ProviderConfig::default(),
            delivery: DeliveryConfig::default(),
            otel: OtelConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
            run_migrations: true,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: default_provider_backend(),
            fcm: FcmConfig::default(),
        }
    }
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            credentials_path: None,
            access_token: None,
            base_url: default_fcm_base_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            probe_title: default_probe_title(),
            probe_body: default_probe_body(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);

        let settings = Settings::default();
        assert_eq!(settings.storage.backend, "memory");
        assert_eq!(settings.provider.backend, "noop");
        assert_eq!(settings.delivery.max_concurrency, 16);
        assert_eq!(settings.delivery.history_limit, 20);
        assert_eq!(settings.server_addr(), "0.0.0.0:8082");
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "storage": { "backend": "postgres" },
            "provider": { "backend": "fcm", "fcm": { "project_id": "demo" } }
        }))
        .unwrap();

        assert_eq!(settings.storage.backend, "postgres");
        assert_eq!(settings.provider.fcm.project_id.as_deref(), Some("demo"));
        assert_eq!(settings.provider.fcm.base_url, "https://fcm.googleapis.com");
        assert_eq!(settings.database.pool_size, 10);
        assert!(!settings.otel.enabled);
    }
}
