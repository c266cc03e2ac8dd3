//! PostgreSQL-based notification store.
//!
//! Tables: `notifications` and `delivery_logs` (see `migrations/`). The unique
//! constraint on `delivery_logs (notification_id, registration_id)` backs the
//! one-entry-per-attempt rule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::storage::StoreError;

use super::backend::NotificationStore;
use super::types::{
    DeliveryLogEntry, DeliveryStatus, DeliverySummary, FailureKind, NewDeliveryLog,
    NewNotification, Notification, Payload, TargetMode,
};

type NotificationRow = (
    Uuid,
    String,
    String,
    serde_json::Value,
    bool,
    Vec<String>,
    DateTime<Utc>,
    i32,
    i32,
    i32,
    Option<DateTime<Utc>>,
);

type LogRow = (Uuid, Uuid, Uuid, String, Option<String>, String, DateTime<Utc>);

const NOTIFICATION_COLUMNS: &str = "id, title, body, payload, target_all, target_owner_ids, \
     created_at, attempted_count, success_count, failure_count, finalized_at";

fn notification_from_row(row: NotificationRow) -> Notification {
    let (
        id,
        title,
        body,
        payload,
        target_all,
        owner_ids,
        created_at,
        attempted,
        succeeded,
        failed,
        finalized_at,
    ) = row;

    let payload = match payload {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    };
    let target = if target_all {
        TargetMode::All
    } else {
        TargetMode::Owners(owner_ids)
    };

    Notification {
        id,
        title,
        body,
        payload,
        target,
        created_at,
        attempted_count: attempted.max(0) as u32,
        success_count: succeeded.max(0) as u32,
        failure_count: failed.max(0) as u32,
        finalized_at,
    }
}

fn log_from_row(row: LogRow) -> Result<DeliveryLogEntry, StoreError> {
    let (id, notification_id, registration_id, status, failure_kind, error_detail, created_at) = row;

    let status = DeliveryStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown delivery status '{}'", status)))?;

    Ok(DeliveryLogEntry {
        id,
        notification_id,
        registration_id,
        status,
        failure_kind: failure_kind.as_deref().and_then(FailureKind::parse),
        error_detail,
        created_at,
    })
}

/// PostgreSQL notification store
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn create_notification(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let notification = Notification::new(new);
        let owner_ids: Vec<String> = notification
            .target
            .owner_filter()
            .map(|ids| ids.to_vec())
            .unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO notifications (id, title, body, payload, target_all, target_owner_ids, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(serde_json::Value::Object(notification.payload.clone()))
        .bind(notification.target.is_all())
        .bind(&owner_ids)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(notification)
    }

    async fn finalize_notification(
        &self,
        id: Uuid,
        summary: DeliverySummary,
    ) -> Result<Notification, StoreError> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            r#"
            UPDATE notifications
            SET attempted_count = $2, success_count = $3, failure_count = $4, finalized_at = NOW()
            WHERE id = $1 AND finalized_at IS NULL
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(summary.attempted as i32)
        .bind(summary.succeeded as i32)
        .bind(summary.failed as i32)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(notification_from_row(row)),
            None => match self.get(id).await? {
                Some(_) => Err(StoreError::AlreadyFinalized(id)),
                None => Err(StoreError::NotFound(format!("notification {}", id))),
            },
        }
    }

    async fn append_log(&self, entry: NewDeliveryLog) -> Result<DeliveryLogEntry, StoreError> {
        let log = DeliveryLogEntry::new(entry);

        let inserted = sqlx::query(
            r#"
            INSERT INTO delivery_logs
                (id, notification_id, registration_id, status, failure_kind, error_detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (notification_id, registration_id) DO NOTHING
            "#,
        )
        .bind(log.id)
        .bind(log.notification_id)
        .bind(log.registration_id)
        .bind(log.status.as_str())
        .bind(log.failure_kind.map(|k| k.as_str()))
        .bind(&log.error_detail)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::Duplicate(format!(
                "delivery log for notification {} and registration {}",
                log.notification_id, log.registration_id
            )));
        }

        Ok(log)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(notification_from_row))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications ORDER BY created_at DESC LIMIT $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(notification_from_row).collect())
    }

    async fn logs_for(&self, notification_id: Uuid) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT id, notification_id, registration_id, status, failure_kind, error_detail, created_at
            FROM delivery_logs
            WHERE notification_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(log_from_row).collect()
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}
