//! Services composing the enforcement pipeline.

pub mod device_tracker;
pub mod enforcement;
pub mod plex;
pub mod session_log;
pub mod settings;
