//! One poll cycle for one entity: fetch → diff → persist → log.
//!
//! [`EntityMonitor::run_once`] walks an explicit phase machine:
//!
//! ```text
//! Idle → Fetching → Diffing → Persisting → Done
//!            └──────────┴──────────┴──────→ Failed
//! ```
//!
//! Everything the remote returns is fetched before anything is written, so a
//! fetch failure leaves no partial state behind. Individual media downloads
//! may fail without failing the cycle; such sets stay out of the dedup list
//! and are retried on the next cycle.

mod report;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{Instrument, debug, info, warn};

use crate::diff;
use crate::error::Result;
use crate::source::{Category, MediaSet, MediaSink, ProfileAttributes, ProfileSource};
use crate::store::{EntityState, ItemSetRecord, MetadataLog, StateStore, TimestampEntry};
pub use report::CycleReport;

/// Format of cycle timestamps; lexicographic order equals time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Diffing,
    Persisting,
    Done,
    Failed,
}

/// What a cycle collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Media categories polled each cycle.
    pub categories: Vec<Category>,
    /// Call [`MediaSink::download_full_profile_snapshot`] after persisting.
    pub snapshot_profile: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            categories: Category::ALL.to_vec(),
            snapshot_profile: true,
        }
    }
}

/// Collaborators and storage shared by every entity's monitor.
#[derive(Clone)]
pub struct MonitorContext {
    pub store: StateStore,
    pub source: Arc<dyn ProfileSource>,
    pub sink: Arc<dyn MediaSink>,
    pub options: MonitorOptions,
}

impl MonitorContext {
    pub fn new(
        store: StateStore,
        source: Arc<dyn ProfileSource>,
        sink: Arc<dyn MediaSink>,
    ) -> Self {
        Self {
            store,
            source,
            sink,
            options: MonitorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MonitorOptions) -> Self {
        self.options = options;
        self
    }
}

/// Poll-cycle driver for a single entity.
pub struct EntityMonitor {
    entity: String,
    context: MonitorContext,
    phase: CyclePhase,
}

impl EntityMonitor {
    pub fn new(entity: impl Into<String>, context: MonitorContext) -> Self {
        Self {
            entity: entity.into(),
            context,
            phase: CyclePhase::Idle,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Run one cycle stamped with the current local time.
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.run_once_at(&timestamp).await
    }

    /// Run one cycle stamped with `timestamp`.
    pub async fn run_once_at(&mut self, timestamp: &str) -> Result<CycleReport> {
        let span = tracing::info_span!(
            "cycle",
            entity = %self.entity,
            cycle_id = %uuid::Uuid::new_v4(),
        );
        self.phase = CyclePhase::Idle;
        let result = self.run_cycle(timestamp).instrument(span).await;
        match &result {
            Ok(_) => self.transition(CyclePhase::Done),
            Err(_) => self.transition(CyclePhase::Failed),
        }
        result
    }

    /// Mark the cycle failed after it was abandoned from outside (watchdog).
    pub(crate) fn mark_failed(&mut self) {
        self.transition(CyclePhase::Failed);
    }

    fn transition(&mut self, next: CyclePhase) {
        debug!(entity = %self.entity, from = ?self.phase, to = ?next, "cycle phase");
        self.phase = next;
    }

    async fn run_cycle(&mut self, timestamp: &str) -> Result<CycleReport> {
        self.transition(CyclePhase::Fetching);
        let store = self.context.store.clone();
        let mut state = store.load(&self.entity)?;
        let mut log = MetadataLog::load(store.metadata_path(&self.entity))?;

        let attributes = self
            .context
            .source
            .fetch_profile_attributes(&self.entity)
            .await?;
        let mut collections = Vec::with_capacity(self.context.options.categories.len());
        for &category in &self.context.options.categories {
            let sets = self
                .context
                .source
                .fetch_media_collection(&self.entity, category)
                .await?;
            debug!(%category, fetched = sets.len(), "media collection fetched");
            collections.push((category, sets));
        }

        self.transition(CyclePhase::Diffing);
        self.log_profile_changes(&state, &attributes);
        let record = diff::profile_record(&attributes);
        let fresh: Vec<(Category, Vec<MediaSet>)> = collections
            .into_iter()
            .map(|(category, sets)| {
                let unseen = diff::new_items(state.dedup(category).ids(), sets);
                (category, first_occurrences(unseen))
            })
            .collect();

        self.transition(CyclePhase::Persisting);
        let mut report = CycleReport::new(&self.entity, timestamp);
        report.not_following_back = record.not_following_back.clone();

        for (category, sets) in fresh {
            let (entry, completed) = self.download_sets(category, &sets, &mut report).await;
            log.append(category, timestamp, entry);
            let added = state.dedup_mut(category).extend_new(completed);
            debug!(%category, added, "dedup list extended");
            report
                .new_sets
                .insert(category, sets.into_iter().map(|set| set.id).collect());
        }
        log.flush()?;

        state.snapshot.insert(timestamp.to_owned(), record);
        if !attributes.user_id.is_empty() {
            state.profile_id = Some(attributes.user_id.clone());
        }
        store.save(&self.entity, &state)?;

        if self.context.options.snapshot_profile {
            match self
                .context
                .sink
                .download_full_profile_snapshot(&self.entity)
                .await
            {
                Ok(()) => report.profile_snapshot = Some(true),
                Err(e) => {
                    warn!(error = %e, "profile snapshot failed");
                    report.profile_snapshot = Some(false);
                }
            }
        }

        info!(
            new_sets = report.new_set_count(),
            failed_downloads = report.failed_downloads,
            "cycle persisted"
        );
        Ok(report)
    }

    /// Download every entry of the new sets. Returns the metadata entry for
    /// this cycle and the ids of sets whose entries were all stored.
    async fn download_sets(
        &self,
        category: Category,
        sets: &[MediaSet],
        report: &mut CycleReport,
    ) -> (TimestampEntry, Vec<String>) {
        let mut entry = TimestampEntry::new();
        let mut completed = Vec::new();

        for set in sets {
            info!(
                %category,
                set_id = %set.id,
                title = set.title.as_deref().unwrap_or(""),
                items = set.items.len(),
                "downloading new media set"
            );
            let mut record = ItemSetRecord::from_set(set);
            for (item, media) in record.items.iter_mut().zip(&set.items) {
                match self
                    .context
                    .sink
                    .download_item(&self.entity, media, category)
                    .await
                {
                    Ok(()) => item.downloaded = true,
                    Err(e) => {
                        warn!(%category, set_id = %set.id, media_id = %media.media_id, error = %e, "media download failed, will retry next cycle");
                        report.failed_downloads += 1;
                    }
                }
            }
            if record.fully_downloaded() {
                completed.push(set.id.clone());
            }
            entry.insert(set.id.clone(), record);
        }

        (entry, completed)
    }

    fn log_profile_changes(&self, state: &EntityState, attributes: &ProfileAttributes) {
        if let Some(previous_id) = &state.profile_id {
            if !attributes.user_id.is_empty() && *previous_id != attributes.user_id {
                warn!(
                    previous = %previous_id,
                    current = %attributes.user_id,
                    "profile id changed"
                );
            }
        }

        let Some((since, previous)) = state.latest_record() else {
            info!(
                followers = attributes.followers_count,
                following = attributes.following_count,
                "first snapshot"
            );
            return;
        };

        for change in diff::attribute_changes(previous, attributes) {
            info!(since, "{change}");
        }

        let followers = diff::log_delta(
            &diff::account_names(&previous.followers),
            &diff::account_names(&attributes.followers),
        );
        if !followers.added.is_empty() {
            info!(since, added = ?followers.added, "new followers");
        }
        if !followers.removed.is_empty() {
            info!(since, removed = ?followers.removed, "lost followers");
        }

        let following = diff::log_delta(
            &diff::account_names(&previous.following),
            &diff::account_names(&attributes.following),
        );
        if !following.added.is_empty() {
            info!(since, added = ?following.added, "started following");
        }
        if !following.removed.is_empty() {
            info!(since, removed = ?following.removed, "stopped following");
        }
    }
}

/// Drop sets whose id already appeared earlier in the same fetch.
fn first_occurrences(sets: Vec<MediaSet>) -> Vec<MediaSet> {
    let mut ids = HashSet::new();
    sets.into_iter()
        .filter(|set| ids.insert(set.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests;
