//! Append-mostly log of observed sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed session's lifetime. A row with `ended_at = None` is still
/// active as of the last poll. The policy engine reads `started_at` only, to
/// order a user's concurrent sessions by age.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistory {
    pub id: i64,
    pub session_key: String,
    pub user_id: String,
    pub device_id: Option<i64>,
    pub device_address: Option<String>,
    pub title: Option<String>,
    pub grandparent_title: Option<String>,
    pub parent_title: Option<String>,
    pub year: Option<i32>,
    pub media_type: Option<String>,
    pub rating_key: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionHistory {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_active() {
        let now = Utc::now();
        let mut row = SessionHistory {
            id: 1,
            session_key: "s1".to_string(),
            user_id: "42".to_string(),
            device_id: Some(7),
            device_address: Some("10.0.0.5".to_string()),
            title: Some("Pilot".to_string()),
            grandparent_title: Some("Some Show".to_string()),
            parent_title: Some("Season 1".to_string()),
            year: Some(2020),
            media_type: Some("episode".to_string()),
            rating_key: Some("12345".to_string()),
            started_at: now,
            ended_at: None,
        };
        assert!(row.is_active());

        row.ended_at = Some(now);
        assert!(!row.is_active());
    }
}
