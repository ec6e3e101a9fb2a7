//! Per-entity "last known state".
//!
//! Four small documents live under `<root>/<entity>_data/`:
//!
//! | Document | File |
//! |---|---|
//! | snapshot (timestamp → profile record) | `data.json` |
//! | highlights dedup list | `highlights/downloaded_highlights.json` |
//! | stories dedup list | `stories/downloaded_stories.json` |
//! | remote profile id | `profile_id.json` |
//!
//! They are loaded and saved together as one [`EntityState`] but are otherwise
//! independent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::fs::{read_json, remove_if_exists, write_json_atomic};
use crate::error::Result;
use crate::source::{Account, Category};

/// Timestamp → profile record. Keys use a sortable format, so the last key is
/// the latest poll.
pub type Snapshot = BTreeMap<String, ProfileRecord>;

/// Attributes captured at one cycle's timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileRecord {
    pub followers_count: u64,
    pub following_count: u64,
    pub bio: String,
    pub profile_pic_url: Option<String>,
    pub followers: Vec<Account>,
    pub following: Vec<Account>,
    /// Names in `following` with no match in `followers`.
    pub not_following_back: Vec<String>,
}

/// Ids of media sets already processed for one category.
///
/// Only grows; order is insertion order and carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupList(Vec<String>);

impl DedupList {
    pub fn new(ids: Vec<String>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|seen| seen == id)
    }

    /// Append ids not already present. Returns how many were added.
    pub fn extend_new<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.0.len();
        for id in ids {
            let id = id.into();
            if !self.contains(&id) {
                self.0.push(id);
            }
        }
        self.0.len() - before
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything persisted about one entity apart from the metadata log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityState {
    pub snapshot: Snapshot,
    pub highlights: DedupList,
    pub stories: DedupList,
    /// Remote user id seen on the last successful cycle.
    pub profile_id: Option<String>,
}

impl EntityState {
    pub fn dedup(&self, category: Category) -> &DedupList {
        match category {
            Category::Highlights => &self.highlights,
            Category::Stories => &self.stories,
        }
    }

    pub fn dedup_mut(&mut self, category: Category) -> &mut DedupList {
        match category {
            Category::Highlights => &mut self.highlights,
            Category::Stories => &mut self.stories,
        }
    }

    /// The most recent snapshot record, if any cycle has completed.
    pub fn latest_record(&self) -> Option<(&str, &ProfileRecord)> {
        self.snapshot
            .iter()
            .next_back()
            .map(|(ts, record)| (ts.as_str(), record))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileIdDocument {
    profile_id: String,
}

/// Filesystem-backed store rooted at one data directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<entity>_data/`
    pub fn entity_dir(&self, entity: &str) -> PathBuf {
        self.root.join(format!("{entity}_data"))
    }

    /// Where media of one category is stored.
    pub fn category_dir(&self, entity: &str, category: Category) -> PathBuf {
        self.entity_dir(entity).join(category.as_str())
    }

    /// Where whole-profile archives are stored.
    pub fn profile_dir(&self, entity: &str) -> PathBuf {
        self.entity_dir(entity).join("profile")
    }

    pub fn snapshot_path(&self, entity: &str) -> PathBuf {
        self.entity_dir(entity).join("data.json")
    }

    pub fn dedup_path(&self, entity: &str, category: Category) -> PathBuf {
        self.category_dir(entity, category)
            .join(format!("downloaded_{}.json", category.as_str()))
    }

    pub fn profile_id_path(&self, entity: &str) -> PathBuf {
        self.entity_dir(entity).join("profile_id.json")
    }

    pub fn metadata_path(&self, entity: &str) -> PathBuf {
        self.entity_dir(entity).join("metadata.json")
    }

    /// Load the entity's state. Missing documents come back empty.
    pub fn load(&self, entity: &str) -> Result<EntityState> {
        let snapshot = read_json(&self.snapshot_path(entity))?.unwrap_or_default();
        let highlights =
            read_json(&self.dedup_path(entity, Category::Highlights))?.unwrap_or_default();
        let stories = read_json(&self.dedup_path(entity, Category::Stories))?.unwrap_or_default();
        let profile_id = read_json::<ProfileIdDocument>(&self.profile_id_path(entity))?
            .map(|doc| doc.profile_id);

        Ok(EntityState {
            snapshot,
            highlights,
            stories,
            profile_id,
        })
    }

    /// Overwrite the entity's state, one atomic write per document.
    pub fn save(&self, entity: &str, state: &EntityState) -> Result<()> {
        write_json_atomic(&self.snapshot_path(entity), &state.snapshot)?;
        for category in Category::ALL {
            write_json_atomic(&self.dedup_path(entity, category), state.dedup(category))?;
        }

        let id_path = self.profile_id_path(entity);
        match &state.profile_id {
            Some(profile_id) => write_json_atomic(
                &id_path,
                &ProfileIdDocument {
                    profile_id: profile_id.clone(),
                },
            )?,
            None => remove_if_exists(&id_path)?,
        }

        tracing::debug!(entity, root = %self.root.display(), "entity state saved");
        Ok(())
    }
}
