use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JSON object carried with a notification
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Which registrations a notification is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "owner_ids", rename_all = "snake_case")]
pub enum TargetMode {
    /// Every active registration
    All,
    /// Active registrations owned by one of these owner ids
    Owners(Vec<String>),
}

impl TargetMode {
    /// Owner filter for the registration store, `None` meaning all owners
    pub fn owner_filter(&self) -> Option<&[String]> {
        match self {
            TargetMode::All => None,
            TargetMode::Owners(ids) => Some(ids.as_slice()),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, TargetMode::All)
    }
}

/// Fields supplied when a notification is created
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub title: String,
    pub body: String,
    pub payload: Payload,
    pub target: TargetMode,
}

/// Final counters of a completed fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeliverySummary {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
}

impl DeliverySummary {
    pub fn is_consistent(&self) -> bool {
        self.succeeded + self.failed == self.attempted
    }
}

/// One dispatch request and, once finalized, its outcome counters.
///
/// Counters stay at zero and `finalized_at` stays `None` until the fan-out
/// completes. A notification with zero counters and no `finalized_at` did not
/// finish; it is not a notification that reached zero devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub payload: Payload,
    pub target: TargetMode,
    pub created_at: DateTime<Utc>,
    pub attempted_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(new: NewNotification) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            body: new.body,
            payload: new.payload,
            target: new.target,
            // PostgreSQL keeps microseconds; the outbound timestamp must match
            created_at: Utc::now().trunc_subsecs(6),
            attempted_count: 0,
            success_count: 0,
            failure_count: 0,
            finalized_at: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }

    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            attempted: self.attempted_count,
            succeeded: self.success_count,
            failed: self.failure_count,
        }
    }

    /// Apply final counters. Only the first call has an effect.
    pub fn finalize(&mut self, summary: DeliverySummary) -> bool {
        if self.is_finalized() {
            return false;
        }
        self.attempted_count = summary.attempted;
        self.success_count = summary.succeeded;
        self.failure_count = summary.failed;
        self.finalized_at = Some(Utc::now());
        true
    }
}

/// Recorded status of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    /// Reserved for delivery receipts; never written by the fan-out
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            "delivered" => Some(DeliveryStatus::Delivered),
            _ => None,
        }
    }
}

/// Why a delivery attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidArgument,
    Unregistered,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidArgument => "invalid_argument",
            FailureKind::Unregistered => "unregistered",
            FailureKind::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "invalid_argument" => Some(FailureKind::InvalidArgument),
            "unregistered" => Some(FailureKind::Unregistered),
            "unknown" => Some(FailureKind::Unknown),
            _ => None,
        }
    }
}

/// Fields supplied when a delivery attempt is logged
#[derive(Debug, Clone)]
pub struct NewDeliveryLog {
    pub notification_id: Uuid,
    pub registration_id: Uuid,
    pub status: DeliveryStatus,
    pub failure_kind: Option<FailureKind>,
    /// Empty unless the attempt failed
    pub error_detail: String,
}

/// Immutable record of one delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub registration_id: Uuid,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub error_detail: String,
    pub created_at: DateTime<Utc>,
}

impl DeliveryLogEntry {
    pub fn new(new: NewDeliveryLog) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id: new.notification_id,
            registration_id: new.registration_id,
            status: new.status,
            failure_kind: new.failure_kind,
            error_detail: new.error_detail,
            created_at: Utc::now(),
        }
    }
}
