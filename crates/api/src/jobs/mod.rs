//! Background jobs and the poll loop.

mod cleanup_devices;
mod poll_sessions;
mod pool_metrics;
mod scheduler;

pub use cleanup_devices::CleanupDevicesJob;
pub use poll_sessions::SessionPollLoop;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
