use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::devices::{list_devices, register_device, test_token};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::notifications::{list_notifications, notification_logs, send_notification};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                // Devices
                .route("/devices", get(list_devices))
                .route("/devices/register", post(register_device))
                .route("/devices/test-token", post(test_token))
                // Notifications
                .route("/notifications", get(list_notifications))
                .route("/notifications/send", post(send_notification))
                .route("/notifications/{id}/logs", get(notification_logs)),
        )
}
