use std::collections::BTreeMap;

use crate::source::Category;

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub entity: String,
    /// Snapshot and metadata-log key of this cycle.
    pub timestamp: String,
    /// Ids of sets not seen before, per polled category, in fetch order.
    pub new_sets: BTreeMap<Category, Vec<String>>,
    /// Media entries that could not be stored.
    pub failed_downloads: usize,
    pub not_following_back: Vec<String>,
    /// `None` when profile snapshots are disabled.
    pub profile_snapshot: Option<bool>,
}

impl CycleReport {
    pub fn new(entity: &str, timestamp: &str) -> Self {
        Self {
            entity: entity.to_owned(),
            timestamp: timestamp.to_owned(),
            ..Self::default()
        }
    }

    pub fn new_set_count(&self) -> usize {
        self.new_sets.values().map(Vec::len).sum()
    }
}
