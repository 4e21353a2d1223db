//! Settings repository for database operations.

use sqlx::PgPool;

use crate::entities::SettingEntity;
use crate::metrics::QueryTimer;
use domain::models::SettingKind;

const SETTING_COLUMNS: &str = "key, value, value_type, private, updated_at";

/// Repository for the typed key/value settings table.
#[derive(Clone)]
pub struct SettingRepository {
    pool: PgPool,
}

impl SettingRepository {
    /// Creates a new SettingRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch one setting.
    pub async fn find(&self, key: &str) -> Result<Option<SettingEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_setting");
        let result = sqlx::query_as::<_, SettingEntity>(&format!(
            "SELECT {SETTING_COLUMNS} FROM settings WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// List every setting.
    pub async fn list_all(&self) -> Result<Vec<SettingEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_settings");
        let result = sqlx::query_as::<_, SettingEntity>(&format!(
            "SELECT {SETTING_COLUMNS} FROM settings ORDER BY key"
        ))
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Seed a setting if it does not exist yet. Existing values are left
    /// untouched.
    pub async fn insert_default(
        &self,
        key: &str,
        value: &str,
        kind: SettingKind,
        private: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, value_type, private)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(kind.as_str())
        .bind(private)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update the raw value of an existing setting. Returns 0 when the key
    /// is unknown; new keys only enter through `insert_default`.
    pub async fn set_value(&self, key: &str, value: &str) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("set_setting_value");
        let result =
            sqlx::query("UPDATE settings SET value = $2, updated_at = NOW() WHERE key = $1")
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_columns_cover_entity() {
        for column in ["key", "value", "value_type", "private", "updated_at"] {
            assert!(SETTING_COLUMNS.contains(column), "{column}");
        }
    }

    #[test]
    fn test_repository_is_cloneable() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<SettingRepository>();
    }
}
