use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform a device token was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Web,
    Android,
    Ios,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Web => "web",
            DeviceType::Android => "android",
            DeviceType::Ios => "ios",
        }
    }

    /// Parse a stored value; unknown values fall back to `Web`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "android" => DeviceType::Android,
            "ios" => DeviceType::Ios,
            _ => DeviceType::Web,
        }
    }
}

/// A recipient endpoint that can receive push notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub id: Uuid,
    /// Provider-issued token, unique per registration
    pub token: String,
    /// Owner the device belongs to, if known
    pub owner_id: Option<String>,
    pub device_type: DeviceType,
    /// Inactive registrations are never targeted
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl DeviceRegistration {
    pub fn new(token: impl Into<String>, owner_id: Option<String>, device_type: DeviceType) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: token.into(),
            owner_id,
            device_type,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Whether this registration is eligible under an optional owner filter
    pub fn matches(&self, owner_ids: Option<&[String]>) -> bool {
        if !self.active {
            return false;
        }
        match owner_ids {
            None => true,
            Some(ids) => self
                .owner_id
                .as_ref()
                .is_some_and(|owner| ids.iter().any(|id| id == owner)),
        }
    }
}
