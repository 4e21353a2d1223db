//! Domain model definitions.

mod decision;
mod device;
mod session;
mod session_history;
mod setting;
mod time_rule;
mod user_preference;

pub use decision::{Decision, SessionDecision, StopCode};
pub use device::{
    Device, DeviceNote, DeviceResponse, DeviceStatus, SubmitNoteRequest, TempAccess,
    TempAccessUpdate, UpdateDeviceRequest,
};
pub use session::{
    ContentInfo, MediaInfo, PlayerInfo, Session, SessionSnapshot, SessionUser,
};
pub use session_history::SessionHistory;
pub use setting::{render_setting_value, Setting, SettingKind, UpdateSettingsRequest};
pub use time_rule::{CreateTimeRuleRequest, TimeRule, UpdateTimeRuleRequest};
pub use user_preference::{
    ConcurrentLimitRequest, IpAccessPolicy, IpPolicyRequest, NetworkPolicy, PreferenceRequest,
    UserPreference,
};
