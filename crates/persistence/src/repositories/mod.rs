//! Repository implementations.

mod device;
mod session_history;
mod setting;
mod time_rule;
mod user_preference;

pub use device::{DeviceRepository, ObservedDevice};
pub use session_history::{NewHistoryRow, SessionHistoryRepository};
pub use setting::SettingRepository;
pub use time_rule::TimeRuleRepository;
pub use user_preference::UserPreferenceRepository;
