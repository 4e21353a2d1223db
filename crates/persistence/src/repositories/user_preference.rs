//! User preference repository for database operations.
//!
//! Rows are created lazily: the tracker upserts on first observation, and
//! every admin write upserts so a preference can exist before the user is
//! ever seen streaming.

use sqlx::PgPool;

use crate::entities::UserPreferenceEntity;
use crate::metrics::QueryTimer;
use domain::models::{IpAccessPolicy, NetworkPolicy};

const PREFERENCE_COLUMNS: &str = r#"user_id, username, avatar_url, hidden, default_block,
       network_policy, ip_access_policy, allowed_ips, concurrent_stream_limit,
       created_at, updated_at"#;

/// Repository for user-preference database operations.
#[derive(Clone)]
pub struct UserPreferenceRepository {
    pool: PgPool,
}

impl UserPreferenceRepository {
    /// Creates a new UserPreferenceRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find one user's preference row.
    pub async fn find(&self, user_id: &str) -> Result<Option<UserPreferenceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_preference");
        let result = sqlx::query_as::<_, UserPreferenceEntity>(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM user_preferences WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// List every known user.
    pub async fn list_all(&self) -> Result<Vec<UserPreferenceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_user_preferences");
        let result = sqlx::query_as::<_, UserPreferenceEntity>(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM user_preferences ORDER BY username NULLS LAST"
        ))
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Load preferences for a set of users in one round trip.
    pub async fn list_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<UserPreferenceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_user_preferences_for_users");
        let result = sqlx::query_as::<_, UserPreferenceEntity>(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM user_preferences WHERE user_id = ANY($1)"
        ))
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Upsert the row for an observed user. Display fields only fill gaps;
    /// an admin-chosen username is never clobbered by the poll loop.
    pub async fn upsert_observed(
        &self,
        user_id: &str,
        username: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_observed_user");
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, username, avatar_url)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                username = COALESCE(user_preferences.username, EXCLUDED.username),
                avatar_url = COALESCE(user_preferences.avatar_url, EXCLUDED.avatar_url),
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(username)
        .bind(avatar_url)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(())
    }

    /// Set or clear the per-user default-block override.
    pub async fn set_default_block(
        &self,
        user_id: &str,
        default_block: Option<bool>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("set_default_block");
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, default_block)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                default_block = EXCLUDED.default_block,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(default_block)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(())
    }

    /// Replace the user's network policy and IP allow-list.
    pub async fn set_ip_policy(
        &self,
        user_id: &str,
        network_policy: NetworkPolicy,
        ip_access_policy: IpAccessPolicy,
        allowed_ips: &[String],
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("set_ip_policy");
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, network_policy, ip_access_policy, allowed_ips)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                network_policy = EXCLUDED.network_policy,
                ip_access_policy = EXCLUDED.ip_access_policy,
                allowed_ips = EXCLUDED.allowed_ips,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(network_policy.as_str())
        .bind(ip_access_policy.as_str())
        .bind(serde_json::json!(allowed_ips))
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(())
    }

    /// Set or clear the per-user concurrent-stream limit.
    pub async fn set_concurrent_limit(
        &self,
        user_id: &str,
        limit: Option<i32>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("set_concurrent_limit");
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, concurrent_stream_limit)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                concurrent_stream_limit = EXCLUDED.concurrent_stream_limit,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(())
    }

    /// Hide or show a user in the admin listing.
    pub async fn set_hidden(&self, user_id: &str, hidden: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, hidden)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                hidden = EXCLUDED.hidden,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(hidden)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
