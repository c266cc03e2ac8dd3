//! Outbound message template shared by every device of a fan-out.

use crate::notification::{Notification, Payload};
use crate::provider::PushMessage;

/// Reserved data key carrying the notification id
pub const NOTIFICATION_ID_KEY: &str = "notification_id";

/// Reserved data key carrying the notification creation time (RFC 3339)
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Title, body and data built once per notification
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundTemplate {
    pub title: String,
    pub body: String,
    pub data: Payload,
}

impl OutboundTemplate {
    /// Merge the caller payload with the reserved keys.
    ///
    /// Reserved keys always carry the notification's own id and timestamp;
    /// caller values under those keys are dropped.
    pub fn build(notification: &Notification) -> Self {
        let mut data = Payload::new();

        for (key, value) in &notification.payload {
            if is_reserved(key) {
                tracing::warn!(
                    notification_id = %notification.id,
                    key = %key,
                    "Caller payload key collides with reserved key, ignoring caller value"
                );
                continue;
            }
            data.insert(key.clone(), value.clone());
        }

        data.insert(
            NOTIFICATION_ID_KEY.to_string(),
            serde_json::Value::String(notification.id.to_string()),
        );
        data.insert(
            TIMESTAMP_KEY.to_string(),
            serde_json::Value::String(notification.created_at.to_rfc3339()),
        );

        Self {
            title: notification.title.clone(),
            body: notification.body.clone(),
            data,
        }
    }

    /// Address the template to one device token
    pub fn address(&self, token: &str) -> PushMessage {
        PushMessage {
            token: token.to_string(),
            title: self.title.clone(),
            body: self.body.clone(),
            data: self.data.clone(),
        }
    }
}

fn is_reserved(key: &str) -> bool {
    key == NOTIFICATION_ID_KEY || key == TIMESTAMP_KEY
}
