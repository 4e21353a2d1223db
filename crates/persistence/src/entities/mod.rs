//! Entity definitions (database row mappings).

mod device;
mod session_history;
mod setting;
mod time_rule;
mod user_preference;

pub use device::DeviceEntity;
pub use session_history::SessionHistoryEntity;
pub use setting::SettingEntity;
pub use time_rule::TimeRuleEntity;
pub use user_preference::UserPreferenceEntity;
