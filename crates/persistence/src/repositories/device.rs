//! Device repository for database operations.
//!
//! The device tracker is the only writer of observation fields; admin
//! handlers write the moderation fields. Upserts key on the natural
//! `(user_id, device_identifier)` pair so concurrent writers serialize per
//! device row.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::entities::DeviceEntity;
use crate::metrics::QueryTimer;
use domain::models::DeviceStatus;

const DEVICE_COLUMNS: &str = r#"id, user_id, device_identifier, display_name, platform, product,
       version, status, exclude_from_concurrent_limit, first_seen, last_seen,
       last_ip, session_count, temp_access_until, temp_access_granted_at,
       temp_access_duration_minutes, temp_access_bypass_policies,
       request_description, request_submitted_at, request_read_at,
       created_at, updated_at"#;

/// Fields observed for a device in one session snapshot.
#[derive(Debug, Clone)]
pub struct ObservedDevice<'a> {
    pub user_id: &'a str,
    pub device_identifier: &'a str,
    pub display_name: &'a str,
    pub platform: Option<&'a str>,
    pub product: Option<&'a str>,
    pub version: Option<&'a str>,
    pub address: &'a str,
}

/// Repository for device-related database operations.
#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a device by its natural key.
    pub async fn find_by_natural_key(
        &self,
        user_id: &str,
        device_identifier: &str,
    ) -> Result<Option<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_device_by_natural_key");
        let result = sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = $1 AND device_identifier = $2"
        ))
        .bind(user_id)
        .bind(device_identifier)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find a device by its surrogate id.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_device_by_id");
        let result = sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// List every device, most recently seen first.
    pub async fn list_all(&self) -> Result<Vec<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_devices");
        let result = sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices ORDER BY last_seen DESC"
        ))
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// List a user's devices, most recently seen first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_devices_for_user");
        let result = sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = $1 ORDER BY last_seen DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Load the devices for a set of users in one round trip; used to
    /// assemble the policy input for a snapshot.
    pub async fn list_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_devices_for_users");
        let result = sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = ANY($1)"
        ))
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Insert a first-seen device. Returns None when another writer beat us
    /// to it; the caller falls back to the update path on the next tick.
    pub async fn insert_observed(
        &self,
        observed: &ObservedDevice<'_>,
        status: DeviceStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("insert_observed_device");
        let result = sqlx::query_as::<_, DeviceEntity>(&format!(
            r#"
            INSERT INTO devices (user_id, device_identifier, display_name, platform, product,
                                 version, status, first_seen, last_seen, last_ip, session_count,
                                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, 1, $8, $8)
            ON CONFLICT (user_id, device_identifier) DO NOTHING
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(observed.user_id)
        .bind(observed.device_identifier)
        .bind(observed.display_name)
        .bind(observed.platform)
        .bind(observed.product)
        .bind(observed.version)
        .bind(status.as_str())
        .bind(now)
        .bind(observed.address)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Refresh observation fields for a re-seen device.
    pub async fn update_observation(
        &self,
        id: i64,
        observed: &ObservedDevice<'_>,
        bump_session_count: bool,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("update_device_observation");
        sqlx::query(
            r#"
            UPDATE devices
            SET platform = COALESCE($2, platform),
                product = COALESCE($3, product),
                version = COALESCE($4, version),
                last_seen = $5,
                last_ip = $6,
                session_count = session_count + $7,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(observed.platform)
        .bind(observed.product)
        .bind(observed.version)
        .bind(now)
        .bind(observed.address)
        .bind(if bump_session_count { 1i64 } else { 0i64 })
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(())
    }

    /// Rename a device (admin action).
    pub async fn rename(&self, id: i64, display_name: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE devices SET display_name = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Change a device's approval status (admin action).
    pub async fn set_status(&self, id: i64, status: DeviceStatus) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("UPDATE devices SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Toggle the concurrent-limit exclusion flag (admin action).
    pub async fn set_concurrent_exclusion(
        &self,
        id: i64,
        exclude: bool,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE devices SET exclude_from_concurrent_limit = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(exclude)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Grant temporary access until the given instant.
    pub async fn grant_temp_access(
        &self,
        id: i64,
        until: DateTime<Utc>,
        duration_minutes: i32,
        bypass_policies: bool,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("grant_temp_access");
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET temp_access_until = $2,
                temp_access_granted_at = $3,
                temp_access_duration_minutes = $4,
                temp_access_bypass_policies = $5,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(until)
        .bind(now)
        .bind(duration_minutes)
        .bind(bypass_policies)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    /// Revoke any temporary access grant.
    pub async fn revoke_temp_access(&self, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET temp_access_until = NULL,
                temp_access_granted_at = NULL,
                temp_access_duration_minutes = NULL,
                temp_access_bypass_policies = FALSE,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record the user's one-shot note. Returns 0 when a note was already
    /// submitted at some point in the device's lifetime.
    pub async fn submit_note(
        &self,
        id: i64,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("submit_device_note");
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET request_description = $2,
                request_submitted_at = $3,
                updated_at = $3
            WHERE id = $1 AND request_submitted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(description)
        .bind(now)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    /// Mark the note read (admin action).
    pub async fn mark_note_read(&self, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET request_read_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND request_submitted_at IS NOT NULL AND request_read_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a device (admin action).
    pub async fn delete(&self, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete devices unseen since the cutoff. Devices with an unread note
    /// or a still-active temp grant are kept.
    pub async fn delete_inactive_since(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_inactive_devices");
        let result = sqlx::query(
            r#"
            DELETE FROM devices
            WHERE last_seen < $1
              AND NOT (request_submitted_at IS NOT NULL AND request_read_at IS NULL)
              AND NOT (temp_access_until IS NOT NULL AND temp_access_until > $2)
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Database operations are exercised against a live pool; these unit
    // tests cover the plain-data pieces.

    #[test]
    fn test_observed_device_borrows_fields() {
        let observed = ObservedDevice {
            user_id: "42",
            device_identifier: "AAA",
            display_name: "Living Room",
            platform: Some("Android"),
            product: None,
            version: None,
            address: "192.168.1.5",
        };
        assert_eq!(observed.user_id, "42");
        assert!(observed.product.is_none());
    }

    #[test]
    fn test_device_columns_cover_entity() {
        for column in [
            "user_id",
            "device_identifier",
            "status",
            "session_count",
            "temp_access_until",
            "request_submitted_at",
        ] {
            assert!(DEVICE_COLUMNS.contains(column), "{column}");
        }
    }

    #[test]
    fn test_repository_is_cloneable() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<DeviceRepository>();
    }
}
