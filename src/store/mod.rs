//! Durable per-entity state: the last-known-state store and the metadata log.

pub mod fs;
pub mod metadata;
pub mod state;

pub use metadata::{EntryRecord, ItemSetRecord, MetadataLog, TimestampEntry};
pub use state::{DedupList, EntityState, ProfileRecord, Snapshot, StateStore};
