//! Device registration and token probe endpoints.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::DeliveryOutcome;
use crate::error::{AppError, Result};
use crate::registration::{DeviceRegistration, DeviceType};
use crate::server::AppState;

/// Request to register a device token
#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    #[serde(default)]
    pub token: String,
    /// Owning user, if any
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, rename = "type")]
    pub device_type: DeviceType,
}

#[derive(Debug, Serialize)]
pub struct RegisterDeviceResponse {
    pub success: bool,
    /// False when the token was already known
    pub created: bool,
    pub device_id: Uuid,
    pub message: String,
}

/// Registered device as shown in the admin listing. The token is never
/// echoed back.
#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub active: bool,
    pub date_created: DateTime<Utc>,
}

impl From<DeviceRegistration> for DeviceResponse {
    fn from(registration: DeviceRegistration) -> Self {
        Self {
            id: registration.id,
            user_id: registration.owner_id,
            device_type: registration.device_type,
            active: registration.active,
            date_created: registration.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TestTokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TestTokenResponse {
    pub success: bool,
    pub message_id: String,
    pub message: String,
}

/// POST /api/v1/devices/register
#[tracing::instrument(name = "api.register_device", skip(state, request), fields(device_type = request.device_type.as_str()))]
pub async fn register_device(
    State(state): State<AppState>,
    Json(request): Json<RegisterDeviceRequest>,
) -> Result<Json<RegisterDeviceResponse>> {
    if request.token.trim().is_empty() {
        return Err(AppError::Validation("Token is required".to_string()));
    }

    let owner_id = request.user_id.as_deref().filter(|id| !id.is_empty());
    let (registration, created) = state
        .stores
        .registrations
        .register(&request.token, owner_id, request.device_type)
        .await?;

    tracing::info!(
        device_id = %registration.id,
        created = created,
        "Device token registered"
    );

    Ok(Json(RegisterDeviceResponse {
        success: true,
        created,
        device_id: registration.id,
        message: "Token has been successfully registered".to_string(),
    }))
}

/// GET /api/v1/devices
pub async fn list_devices(State(state): State<AppState>) -> Result<Json<Vec<DeviceResponse>>> {
    let devices = state.stores.registrations.list().await?;
    Ok(Json(devices.into_iter().map(DeviceResponse::from).collect()))
}

/// POST /api/v1/devices/test-token
///
/// Sends a fixed test message to one token. Bad or unregistered tokens are
/// reported as 400, any other provider failure as 502.
#[tracing::instrument(name = "api.test_token", skip(state, request))]
pub async fn test_token(
    State(state): State<AppState>,
    Json(request): Json<TestTokenRequest>,
) -> Result<Json<TestTokenResponse>> {
    let result = state.engine.probe(&request.token).await?;

    match result.outcome {
        DeliveryOutcome::Success(message_id) => Ok(Json(TestTokenResponse {
            success: true,
            message_id,
            message: "Test notification has been sent!".to_string(),
        })),
        DeliveryOutcome::InvalidArgument(_) => {
            Err(AppError::Validation("Invalid token".to_string()))
        }
        DeliveryOutcome::Unregistered(_) => {
            Err(AppError::Validation("Token is not registered".to_string()))
        }
        DeliveryOutcome::Other(detail) => Err(AppError::Provider(detail)),
    }
}
