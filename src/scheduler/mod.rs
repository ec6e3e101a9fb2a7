//! Per-entity poll scheduling.
//!
//! Each monitored entity gets its own [`ScheduleInstance`]: an independent
//! tokio task that sleeps, runs one cycle and sleeps again. The
//! [`ScheduleManager`] owns the instances and a root cancellation token whose
//! children stop them all on shutdown.

pub mod instance;
pub mod manager;

pub use instance::{CycleOutcome, InstanceStatus, ScheduleInstance};
pub use manager::ScheduleManager;
