//! Notification send and history endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::DispatchRequest;
use crate::error::{AppError, Result};
use crate::notification::{DeliveryLogEntry, Notification, Payload, TargetMode};
use crate::server::AppState;

fn default_send_to_all() -> bool {
    true
}

/// Request to send a notification
#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Extra data delivered with the notification
    #[serde(default)]
    pub data: Payload,
    /// Send to every active device; when false only `user_ids` are targeted
    #[serde(default = "default_send_to_all")]
    pub send_to_all: bool,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

impl SendNotificationRequest {
    fn into_dispatch(self) -> DispatchRequest {
        let target = if self.send_to_all {
            TargetMode::All
        } else {
            TargetMode::Owners(self.user_ids)
        };
        DispatchRequest {
            title: self.title,
            body: self.body,
            payload: self.data,
            target,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendNotificationResponse {
    pub success: bool,
    pub notification_id: Uuid,
    pub total_devices: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub message: String,
}

/// Notification as shown in the history listing
#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub data: Payload,
    pub created_at: DateTime<Utc>,
    pub sent_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub sent_to_all: bool,
    /// False while fan-out is running or if it was aborted
    pub completed: bool,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        let completed = notification.is_finalized();
        Self {
            id: notification.id,
            sent_to_all: notification.target.is_all(),
            title: notification.title,
            body: notification.body,
            data: notification.payload,
            created_at: notification.created_at,
            sent_count: notification.attempted_count,
            success_count: notification.success_count,
            failure_count: notification.failure_count,
            completed,
        }
    }
}

/// POST /api/v1/notifications/send
#[tracing::instrument(
    name = "api.send_notification",
    skip(state, request),
    fields(send_to_all = request.send_to_all, user_count = request.user_ids.len())
)]
pub async fn send_notification(
    State(state): State<AppState>,
    Json(request): Json<SendNotificationRequest>,
) -> Result<Json<SendNotificationResponse>> {
    let result = state.engine.dispatch(request.into_dispatch()).await?;

    Ok(Json(SendNotificationResponse {
        success: true,
        notification_id: result.notification_id,
        total_devices: result.attempted,
        success_count: result.succeeded,
        failure_count: result.failed,
        message: format!(
            "Notification sent! {} successful, {} failed",
            result.succeeded, result.failed
        ),
    }))
}

/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<NotificationResponse>>> {
    let notifications = state
        .stores
        .notifications
        .list_recent(state.settings.delivery.history_limit)
        .await?;

    Ok(Json(
        notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
    ))
}

/// GET /api/v1/notifications/{id}/logs
pub async fn notification_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryLogEntry>>> {
    if state.stores.notifications.get(id).await?.is_none() {
        return Err(AppError::NotFound(format!("Notification {} not found", id)));
    }

    let logs = state.stores.notifications.logs_for(id).await?;
    Ok(Json(logs))
}
