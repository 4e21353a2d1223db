//! Policy decisions and stop codes.

use serde::{Deserialize, Serialize};

/// Stable machine-readable token identifying why a session was terminated.
/// Stop codes are for operator observability; viewers only ever see the
/// configurable reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopCode {
    DevicePending,
    DeviceRejected,
    TimeRestricted,
    ConcurrentLimit,
    LanOnly,
    WanOnly,
    IpNotAllowed,
}

impl StopCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopCode::DevicePending => "DEVICE_PENDING",
            StopCode::DeviceRejected => "DEVICE_REJECTED",
            StopCode::TimeRestricted => "TIME_RESTRICTED",
            StopCode::ConcurrentLimit => "CONCURRENT_LIMIT",
            StopCode::LanOnly => "LAN_ONLY",
            StopCode::WanOnly => "WAN_ONLY",
            StopCode::IpNotAllowed => "IP_NOT_ALLOWED",
        }
    }
}

impl std::fmt::Display for StopCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum Decision {
    Allow,
    Block { reason: String, stop_code: StopCode },
}

impl Decision {
    pub fn block(reason: impl Into<String>, stop_code: StopCode) -> Self {
        Decision::Block {
            reason: reason.into(),
            stop_code,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Decision::Block { .. })
    }
}

/// A decision attached to the session it concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDecision {
    pub session_key: String,
    pub session_id: String,
    pub user_id: String,
    pub device_identifier: String,
    pub address: String,
    pub decision: Decision,
}
