//! profilewatch: periodic profile monitor.
//!
//! Polls a set of remote profiles on independent timers, works out what
//! changed since the previous poll and records it durably.
//!
//! # Architecture
//!
//! - **Source**: [`ProfileSource`] / [`MediaSink`] collaborator traits, with
//!   an HTTP gateway implementation
//! - **Diff**: pure functions over fetched and previously seen data
//! - **Store**: per-entity state documents and the append-only metadata log
//! - **Monitor**: one fetch → diff → persist cycle for one entity
//! - **Scheduler**: one self-rescheduling task per entity, cancelled together
//!   on shutdown

pub mod config;
pub mod diff;
pub mod error;
pub mod monitor;
pub mod paths;
pub mod scheduler;
pub mod source;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::WatchConfig;
pub use error::{DownloadError, FetchError, Result, WatchError};
pub use monitor::{CycleReport, EntityMonitor, MonitorContext, MonitorOptions};
pub use scheduler::{ScheduleInstance, ScheduleManager};
pub use source::http::HttpGateway;
pub use source::{Category, MediaSink, ProfileSource};
pub use store::{MetadataLog, StateStore};
