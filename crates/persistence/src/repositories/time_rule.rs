//! Time rule repository for database operations.

use sqlx::PgPool;

use crate::entities::TimeRuleEntity;
use crate::metrics::QueryTimer;

const RULE_COLUMNS: &str = r#"id, user_id, device_identifier, day_of_week, start_time, end_time,
       enabled, rule_name, created_at, updated_at"#;

/// Repository for time-rule database operations.
#[derive(Clone)]
pub struct TimeRuleRepository {
    pool: PgPool,
}

impl TimeRuleRepository {
    /// Creates a new TimeRuleRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find one rule by id, scoped to its owner.
    pub async fn find_by_id(
        &self,
        id: i64,
        user_id: &str,
    ) -> Result<Option<TimeRuleEntity>, sqlx::Error> {
        let result = sqlx::query_as::<_, TimeRuleEntity>(&format!(
            "SELECT {RULE_COLUMNS} FROM time_rules WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result)
    }

    /// List a user's rules, stable ordering for the UI.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<TimeRuleEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_time_rules_for_user");
        let result = sqlx::query_as::<_, TimeRuleEntity>(&format!(
            "SELECT {RULE_COLUMNS} FROM time_rules WHERE user_id = $1
             ORDER BY day_of_week, start_time, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Load the enabled rules for a set of users in one round trip.
    pub async fn list_enabled_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<TimeRuleEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_enabled_time_rules");
        let result = sqlx::query_as::<_, TimeRuleEntity>(&format!(
            "SELECT {RULE_COLUMNS} FROM time_rules WHERE enabled AND user_id = ANY($1)"
        ))
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Create a rule and return the stored row.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        user_id: &str,
        device_identifier: Option<&str>,
        day_of_week: i16,
        start_time: &str,
        end_time: &str,
        enabled: bool,
        rule_name: &str,
    ) -> Result<TimeRuleEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_time_rule");
        let result = sqlx::query_as::<_, TimeRuleEntity>(&format!(
            r#"
            INSERT INTO time_rules (user_id, device_identifier, day_of_week, start_time,
                                    end_time, enabled, rule_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(device_identifier)
        .bind(day_of_week)
        .bind(start_time)
        .bind(end_time)
        .bind(enabled)
        .bind(rule_name)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Replace a rule's fields and return the stored row.
    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        &self,
        id: i64,
        user_id: &str,
        device_identifier: Option<&str>,
        day_of_week: i16,
        start_time: &str,
        end_time: &str,
        enabled: bool,
        rule_name: &str,
    ) -> Result<Option<TimeRuleEntity>, sqlx::Error> {
        let timer = QueryTimer::new("update_time_rule");
        let result = sqlx::query_as::<_, TimeRuleEntity>(&format!(
            r#"
            UPDATE time_rules
            SET device_identifier = $3,
                day_of_week = $4,
                start_time = $5,
                end_time = $6,
                enabled = $7,
                rule_name = $8,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(device_identifier)
        .bind(day_of_week)
        .bind(start_time)
        .bind(end_time)
        .bind(enabled)
        .bind(rule_name)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Delete a rule. Returns the number of rows removed (0 or 1).
    pub async fn delete(&self, id: i64, user_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM time_rules WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
