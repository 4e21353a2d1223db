//! HTTP middleware and logging initialization.

pub mod logging;
