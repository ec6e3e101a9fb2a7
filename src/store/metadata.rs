//! Append-only metadata log: `category → timestamp → set id → record`.
//!
//! One JSON document per entity (`metadata.json`). Appending under a
//! timestamp that already exists merges by set id: sets recorded earlier under
//! the same timestamp survive, a set with the same id is replaced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fs::{read_json, write_json_atomic};
use crate::error::Result;
use crate::source::{Category, MediaEntry, MediaSet};

/// Sets recorded under one timestamp, keyed by set id.
pub type TimestampEntry = BTreeMap<String, ItemSetRecord>;

/// Metadata of one media set as observed during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemSetRecord {
    pub id: String,
    pub title: Option<String>,
    pub cover_url: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub latest_media: Option<DateTime<Utc>>,
    pub item_count: usize,
    pub items: Vec<EntryRecord>,
}

impl ItemSetRecord {
    /// Build a record from a fetched set. Entries start as not downloaded.
    pub fn from_set(set: &MediaSet) -> Self {
        Self {
            id: set.id.clone(),
            title: set.title.clone(),
            cover_url: set.cover_url.clone(),
            last_seen: set.last_seen,
            latest_media: set.latest_media,
            item_count: set.items.len(),
            items: set.items.iter().map(EntryRecord::from_entry).collect(),
        }
    }

    /// Whether every entry of the set was stored.
    pub fn fully_downloaded(&self) -> bool {
        self.items.iter().all(|item| item.downloaded)
    }
}

/// Metadata of one photo or video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryRecord {
    pub media_id: String,
    pub url: String,
    pub caption: Option<String>,
    pub caption_mentions: Vec<String>,
    pub is_video: bool,
    pub video_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the media bytes were stored during this cycle.
    pub downloaded: bool,
}

impl EntryRecord {
    pub fn from_entry(entry: &MediaEntry) -> Self {
        Self {
            media_id: entry.media_id.clone(),
            url: entry.url.clone(),
            caption: entry.caption.clone(),
            caption_mentions: entry.caption_mentions.clone(),
            is_video: entry.is_video,
            video_url: if entry.is_video {
                entry.video_url.clone()
            } else {
                None
            },
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            downloaded: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetadataDocument {
    #[serde(default)]
    highlights: BTreeMap<String, TimestampEntry>,
    #[serde(default)]
    stories: BTreeMap<String, TimestampEntry>,
}

impl MetadataDocument {
    fn category(&self, category: Category) -> &BTreeMap<String, TimestampEntry> {
        match category {
            Category::Highlights => &self.highlights,
            Category::Stories => &self.stories,
        }
    }

    fn category_mut(&mut self, category: Category) -> &mut BTreeMap<String, TimestampEntry> {
        match category {
            Category::Highlights => &mut self.highlights,
            Category::Stories => &mut self.stories,
        }
    }
}

/// In-memory view of one entity's metadata log.
///
/// Single writer: the owning entity's cycle. Changes stay in memory until
/// [`flush`](Self::flush).
#[derive(Debug, Clone)]
pub struct MetadataLog {
    path: PathBuf,
    document: MetadataDocument,
}

impl MetadataLog {
    /// Load the log at `path`. A missing file is an empty log; malformed
    /// content is an error and the file is not touched.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert an entry, or merge `sets` into an existing one by set id.
    pub fn append(&mut self, category: Category, timestamp: &str, sets: TimestampEntry) {
        self.document
            .category_mut(category)
            .entry(timestamp.to_owned())
            .or_default()
            .extend(sets);
    }

    pub fn entry(&self, category: Category, timestamp: &str) -> Option<&TimestampEntry> {
        self.document.category(category).get(timestamp)
    }

    /// Timestamps recorded for a category, oldest first.
    pub fn timestamps(&self, category: Category) -> impl Iterator<Item = &str> {
        self.document.category(category).keys().map(String::as_str)
    }

    /// Write the whole log back atomically.
    pub fn flush(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.document)
    }
}
