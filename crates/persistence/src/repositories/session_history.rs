//! Session history repository for database operations.
//!
//! History rows track session lifetimes: a row opens when a session key
//! first appears in a snapshot and closes when the key vanishes. The policy
//! engine reads `started_at` to order a user's concurrent sessions.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::entities::SessionHistoryEntity;
use crate::metrics::QueryTimer;

/// Fields for a newly opened history row.
#[derive(Debug, Clone)]
pub struct NewHistoryRow<'a> {
    pub session_key: &'a str,
    pub user_id: &'a str,
    pub device_id: Option<i64>,
    pub device_address: Option<&'a str>,
    pub title: Option<&'a str>,
    pub grandparent_title: Option<&'a str>,
    pub parent_title: Option<&'a str>,
    pub year: Option<i32>,
    pub media_type: Option<&'a str>,
    pub rating_key: Option<&'a str>,
}

/// Repository for session-history database operations.
#[derive(Clone)]
pub struct SessionHistoryRepository {
    pool: PgPool,
}

impl SessionHistoryRepository {
    /// Creates a new SessionHistoryRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Session keys with an open history row.
    pub async fn active_keys(&self) -> Result<Vec<String>, sqlx::Error> {
        let timer = QueryTimer::new("active_session_keys");
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT session_key FROM session_history WHERE ended_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        timer.record();
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// `started_at` for the open rows of the given keys.
    pub async fn started_at_for_keys(
        &self,
        keys: &[String],
    ) -> Result<Vec<(String, DateTime<Utc>)>, sqlx::Error> {
        let timer = QueryTimer::new("session_started_at");
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT session_key, started_at
            FROM session_history
            WHERE ended_at IS NULL AND session_key = ANY($1)
            "#,
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;
        timer.record();
        Ok(rows)
    }

    /// Open a row for a newly started session.
    pub async fn open(
        &self,
        row: &NewHistoryRow<'_>,
        started_at: DateTime<Utc>,
    ) -> Result<SessionHistoryEntity, sqlx::Error> {
        let timer = QueryTimer::new("open_session_history");
        let result = sqlx::query_as::<_, SessionHistoryEntity>(
            r#"
            INSERT INTO session_history (session_key, user_id, device_id, device_address,
                                         title, grandparent_title, parent_title, year,
                                         media_type, rating_key, started_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, session_key, user_id, device_id, device_address, title,
                      grandparent_title, parent_title, year, media_type, rating_key,
                      started_at, ended_at
            "#,
        )
        .bind(row.session_key)
        .bind(row.user_id)
        .bind(row.device_id)
        .bind(row.device_address)
        .bind(row.title)
        .bind(row.grandparent_title)
        .bind(row.parent_title)
        .bind(row.year)
        .bind(row.media_type)
        .bind(row.rating_key)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Close every open row whose session key is no longer present.
    /// Returns the number of rows closed.
    pub async fn close_absent(
        &self,
        present_keys: &[String],
        ended_at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("close_absent_sessions");
        let result = sqlx::query(
            r#"
            UPDATE session_history
            SET ended_at = $2
            WHERE ended_at IS NULL AND session_key <> ALL($1)
            "#,
        )
        .bind(present_keys)
        .bind(ended_at)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}
