//! Setting entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::{Setting, SettingKind};

/// Database row mapping for the settings table.
#[derive(Debug, Clone, FromRow)]
pub struct SettingEntity {
    pub key: String,
    pub value: String,
    pub value_type: String,
    pub private: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<SettingEntity> for Setting {
    fn from(entity: SettingEntity) -> Self {
        Self {
            key: entity.key,
            value: entity.value,
            kind: entity.value_type.parse().unwrap_or(SettingKind::String),
            private: entity.private,
            updated_at: entity.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_to_domain() {
        let setting: Setting = SettingEntity {
            key: "CONCURRENT_STREAM_LIMIT".to_string(),
            value: "2".to_string(),
            value_type: "int".to_string(),
            private: false,
            updated_at: Utc::now(),
        }
        .into();

        assert_eq!(setting.kind, SettingKind::Int);
        assert_eq!(setting.as_int(), Some(2));
    }

    #[test]
    fn test_unknown_kind_falls_back_to_string() {
        let setting: Setting = SettingEntity {
            key: "X".to_string(),
            value: "y".to_string(),
            value_type: "float".to_string(),
            private: false,
            updated_at: Utc::now(),
        }
        .into();
        assert_eq!(setting.kind, SettingKind::String);
    }
}
