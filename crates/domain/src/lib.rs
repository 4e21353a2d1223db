//! Domain layer for the PlexGuard backend.
//!
//! This crate contains:
//! - Domain models (Device, UserPreference, TimeRule, Session, Setting)
//! - The pure policy engine
//! - The in-process event bus

pub mod models;
pub mod services;
