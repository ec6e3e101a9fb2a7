//! Data returned by the remote collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A class of media collection tracked per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Pinned, long-lived story collections.
    Highlights,
    /// Short-lived stories.
    Stories,
}

impl Category {
    /// Every category, in processing order.
    pub const ALL: [Category; 2] = [Category::Highlights, Category::Stories];

    /// Lowercase name used for directories, URLs and log keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Highlights => "highlights",
            Self::Stories => "stories",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(id, name)` member of the follower or following list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
}

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Profile attributes fetched once per cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    /// Stable numeric id of the account on the remote side.
    pub user_id: String,
    pub followers_count: u64,
    pub following_count: u64,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub followers: Vec<Account>,
    #[serde(default)]
    pub following: Vec<Account>,
}

/// A media set: one highlight, or one story reel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSet {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latest_media: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<MediaEntry>,
}

/// A single photo or video inside a [`MediaSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub media_id: String,
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub caption_mentions: Vec<String>,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MediaEntry {
    /// URL of the bytes worth keeping: the video stream for videos, the image
    /// otherwise.
    #[must_use]
    pub fn download_url(&self) -> &str {
        match (&self.video_url, self.is_video) {
            (Some(video), true) => video,
            _ => &self.url,
        }
    }

    /// File extension used when storing this entry.
    #[must_use]
    pub fn file_extension(&self) -> &'static str {
        if self.is_video { "mp4" } else { "jpg" }
    }
}

/// Anything with a stable identifier the diff engine can dedup on.
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for MediaSet {
    fn id(&self) -> &str {
        &self.id
    }
}
