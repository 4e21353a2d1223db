//! Shared utilities for the PlexGuard backend.
//!
//! This crate provides common functionality used across the other crates:
//! - Source-address classification and IP allow-list matching
//! - Fixed-offset wall-clock handling for time rules
//! - Common validation logic for admin request payloads

pub mod net;
pub mod timeclock;
pub mod validation;
