//! API layer - HTTP endpoint handlers organized by domain.

mod devices;
mod health;
mod metrics;
mod notifications;
mod routes;

pub use devices::{
    list_devices, register_device, test_token, DeviceResponse, RegisterDeviceRequest,
    RegisterDeviceResponse, TestTokenRequest, TestTokenResponse,
};
pub use health::{health, stats, HealthResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use notifications::{
    list_notifications, notification_logs, send_notification, NotificationResponse,
    SendNotificationRequest, SendNotificationResponse,
};
pub use routes::api_routes;
