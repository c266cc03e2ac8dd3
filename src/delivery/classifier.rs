//! Classification of provider results into delivery outcomes.
//!
//! | Provider result     | Outcome           | Side effect           |
//! |---------------------|-------------------|-----------------------|
//! | receipt id          | `Success`         | none                  |
//! | `InvalidArgument`   | `InvalidArgument` | none, token stays     |
//! | `Unregistered`      | `Unregistered`    | deactivate device     |
//! | `Other`             | `Other`           | none                  |

use serde::Serialize;
use uuid::Uuid;

use crate::notification::{DeliveryStatus, FailureKind, NewDeliveryLog};
use crate::provider::ProviderError;

/// Error detail recorded for unregistered tokens
pub const UNREGISTERED_DETAIL: &str = "Token unregistered";

/// Classified result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Accepted by the provider, carrying its receipt id
    Success(String),
    InvalidArgument(String),
    Unregistered(String),
    Other(String),
}

/// Corrective action required by an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    None,
    /// Mark the registration inactive
    Deactivate,
}

impl DeliveryOutcome {
    pub fn classify(result: Result<String, ProviderError>) -> Self {
        match result {
            Ok(receipt) => DeliveryOutcome::Success(receipt),
            Err(ProviderError::InvalidArgument(detail)) => DeliveryOutcome::InvalidArgument(detail),
            Err(ProviderError::Unregistered(detail)) => DeliveryOutcome::Unregistered(detail),
            Err(ProviderError::Other(detail)) => DeliveryOutcome::Other(detail),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success(_))
    }

    pub fn side_effect(&self) -> SideEffect {
        match self {
            DeliveryOutcome::Unregistered(_) => SideEffect::Deactivate,
            DeliveryOutcome::Success(_)
            | DeliveryOutcome::InvalidArgument(_)
            | DeliveryOutcome::Other(_) => SideEffect::None,
        }
    }

    pub fn status(&self) -> DeliveryStatus {
        match self {
            DeliveryOutcome::Success(_) => DeliveryStatus::Sent,
            _ => DeliveryStatus::Failed,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            DeliveryOutcome::Success(_) => None,
            DeliveryOutcome::InvalidArgument(_) => Some(FailureKind::InvalidArgument),
            DeliveryOutcome::Unregistered(_) => Some(FailureKind::Unregistered),
            DeliveryOutcome::Other(_) => Some(FailureKind::Unknown),
        }
    }

    /// Text stored in the delivery log; empty on success
    pub fn error_detail(&self) -> String {
        match self {
            DeliveryOutcome::Success(_) => String::new(),
            DeliveryOutcome::Unregistered(_) => UNREGISTERED_DETAIL.to_string(),
            DeliveryOutcome::InvalidArgument(detail) | DeliveryOutcome::Other(detail) => {
                detail.clone()
            }
        }
    }

    /// Short label used in metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success(_) => "success",
            DeliveryOutcome::InvalidArgument(_) => "invalid_argument",
            DeliveryOutcome::Unregistered(_) => "unregistered",
            DeliveryOutcome::Other(_) => "unknown",
        }
    }

    pub fn receipt(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Success(receipt) => Some(receipt),
            _ => None,
        }
    }

    pub fn to_log(&self, notification_id: Uuid, registration_id: Uuid) -> NewDeliveryLog {
        NewDeliveryLog {
            notification_id,
            registration_id,
            status: self.status(),
            failure_kind: self.failure_kind(),
            error_detail: self.error_detail(),
        }
    }
}
