//! PostgreSQL-based registration store.
//!
//! Table: `device_registrations` (see `migrations/`). Token uniqueness is
//! enforced by the table, so concurrent registrations of one token converge on
//! a single row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::storage::StoreError;

use super::backend::RegistrationStore;
use super::types::{DeviceRegistration, DeviceType};

type RegistrationRow = (Uuid, String, Option<String>, String, bool, DateTime<Utc>);

fn from_row(row: RegistrationRow) -> DeviceRegistration {
    let (id, token, owner_id, device_type, active, created_at) = row;
    DeviceRegistration {
        id,
        token,
        owner_id,
        device_type: DeviceType::from_db(&device_type),
        active,
        created_at,
    }
}

/// PostgreSQL registration store
pub struct PostgresRegistrationStore {
    pool: PgPool,
}

impl PostgresRegistrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationStore for PostgresRegistrationStore {
    async fn register(
        &self,
        token: &str,
        owner_id: Option<&str>,
        device_type: DeviceType,
    ) -> Result<(DeviceRegistration, bool), StoreError> {
        if token.trim().is_empty() {
            return Err(StoreError::InvalidInput("token is required".to_string()));
        }

        // xmax = 0 only for freshly inserted rows
        let row: (Uuid, String, Option<String>, String, bool, DateTime<Utc>, bool) = sqlx::query_as(
            r#"
            INSERT INTO device_registrations (id, token, owner_id, device_type, active, created_at)
            VALUES ($1, $2, $3, $4, TRUE, NOW())
            ON CONFLICT (token) DO UPDATE SET active = TRUE
            RETURNING id, token, owner_id, device_type, active, created_at, (xmax = 0) AS created
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(token)
        .bind(owner_id)
        .bind(device_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        let (id, token, owner_id, device_type, active, created_at, created) = row;
        let registration = from_row((id, token, owner_id, device_type, active, created_at));

        tracing::debug!(
            registration_id = %registration.id,
            created = created,
            "Device registration upserted"
        );

        Ok((registration, created))
    }

    async fn list_active(
        &self,
        owner_ids: Option<&[String]>,
    ) -> Result<Vec<DeviceRegistration>, StoreError> {
        let owners: Option<Vec<String>> = owner_ids.map(|ids| ids.to_vec());

        let rows: Vec<RegistrationRow> = sqlx::query_as(
            r#"
            SELECT id, token, owner_id, device_type, active, created_at
            FROM device_registrations
            WHERE active = TRUE
              AND ($1::text[] IS NULL OR owner_id = ANY($1))
            ORDER BY created_at ASC
            "#,
        )
        .bind(owners)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE device_registrations SET active = FALSE WHERE id = $1 AND active = TRUE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<DeviceRegistration>, StoreError> {
        let rows: Vec<RegistrationRow> = sqlx::query_as(
            r#"
            SELECT id, token, owner_id, device_type, active, created_at
            FROM device_registrations
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}
