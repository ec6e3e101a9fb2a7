//! Shared test utilities: in-memory collaborators and fixture builders.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DownloadError, FetchError};
use crate::monitor::MonitorContext;
use crate::source::{
    Account, Category, MediaEntry, MediaSet, MediaSink, ProfileAttributes, ProfileSource,
};
use crate::store::StateStore;

/// Scriptable [`ProfileSource`].
#[derive(Default)]
pub struct FakeSource {
    profiles: Mutex<HashMap<String, ProfileAttributes>>,
    media: Mutex<HashMap<(String, Category), Vec<MediaSet>>>,
    queued_failures: Mutex<HashMap<String, VecDeque<FetchError>>>,
    failures_at_call: Mutex<HashMap<(String, usize), FetchError>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attribute fetch sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_profile(&self, entity: &str, attributes: ProfileAttributes) {
        self.profiles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entity.to_owned(), attributes);
    }

    pub fn set_media(&self, entity: &str, category: Category, sets: Vec<MediaSet>) {
        self.media
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((entity.to_owned(), category), sets);
    }

    /// The next attribute fetch for `entity` fails with `error`.
    pub fn fail_next(&self, entity: &str, error: FetchError) {
        self.queued_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(entity.to_owned())
            .or_default()
            .push_back(error);
    }

    /// The `call`-th attribute fetch for `entity` (counting from 1) fails with
    /// `error`, whenever it happens.
    pub fn fail_call(&self, entity: &str, call: usize, error: FetchError) {
        self.failures_at_call
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((entity.to_owned(), call), error);
    }

    /// Number of attribute fetches (one per cycle) seen for `entity`.
    pub fn calls(&self, entity: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(entity)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProfileSource for FakeSource {
    async fn fetch_profile_attributes(
        &self,
        entity: &str,
    ) -> Result<ProfileAttributes, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            let count = calls.entry(entity.to_owned()).or_default();
            *count += 1;
            *count
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .queued_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(entity)
            .and_then(VecDeque::pop_front);
        if let Some(error) = failure {
            return Err(error);
        }
        let failure = self
            .failures_at_call
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(entity.to_owned(), call));
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(self
            .profiles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(entity)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_media_collection(
        &self,
        entity: &str,
        category: Category,
    ) -> Result<Vec<MediaSet>, FetchError> {
        Ok(self
            .media
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(entity.to_owned(), category))
            .cloned()
            .unwrap_or_default())
    }
}

/// Recording [`MediaSink`] with injectable failures.
#[derive(Default)]
pub struct FakeSink {
    downloaded: Mutex<Vec<(String, Category, String)>>,
    failing_media: Mutex<HashSet<String>>,
    fail_snapshot: AtomicBool,
    snapshots: AtomicUsize,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Downloads of `media_id` fail until [`heal`](Self::heal) is called.
    pub fn fail_media(&self, media_id: &str) {
        self.failing_media
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(media_id.to_owned());
    }

    pub fn heal(&self) {
        self.failing_media
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn fail_snapshots(&self) {
        self.fail_snapshot.store(true, Ordering::SeqCst);
    }

    /// Media ids stored so far, in download order.
    pub fn downloaded(&self) -> Vec<String> {
        self.downloaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, _, media_id)| media_id.clone())
            .collect()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSink for FakeSink {
    async fn download_item(
        &self,
        entity: &str,
        entry: &MediaEntry,
        category: Category,
    ) -> Result<(), DownloadError> {
        let failing = self
            .failing_media
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&entry.media_id);
        if failing {
            return Err(DownloadError::Transfer {
                url: entry.url.clone(),
                reason: "connection reset".to_owned(),
            });
        }
        self.downloaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((entity.to_owned(), category, entry.media_id.clone()));
        Ok(())
    }

    async fn download_full_profile_snapshot(&self, entity: &str) -> Result<(), DownloadError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(DownloadError::Transfer {
                url: format!("archive://{entity}"),
                reason: "archive unavailable".to_owned(),
            });
        }
        Ok(())
    }
}

/// A media set `id` with `items` entries named `{id}-{n}`.
pub fn media_set(id: &str, items: usize) -> MediaSet {
    MediaSet {
        id: id.to_owned(),
        title: Some(format!("title {id}")),
        cover_url: Some(format!("https://cdn.example/{id}/cover.jpg")),
        last_seen: None,
        latest_media: None,
        items: (0..items)
            .map(|n| MediaEntry {
                media_id: format!("{id}-{n}"),
                url: format!("https://cdn.example/{id}/{n}.jpg"),
                caption: None,
                caption_mentions: Vec::new(),
                is_video: false,
                video_url: None,
                created_at: None,
                expires_at: None,
            })
            .collect(),
    }
}

/// Profile attributes with the given follower / following names.
pub fn attributes(followers: &[&str], following: &[&str]) -> ProfileAttributes {
    let accounts = |names: &[&str]| -> Vec<Account> {
        names
            .iter()
            .map(|name| Account::new(format!("id-{name}"), *name))
            .collect()
    };
    ProfileAttributes {
        user_id: "1001".to_owned(),
        followers_count: followers.len() as u64,
        following_count: following.len() as u64,
        bio: "bio".to_owned(),
        avatar_url: Some("https://cdn.example/avatar.jpg".to_owned()),
        followers: accounts(followers),
        following: accounts(following),
    }
}

/// Monitor context over a store at `root` and the given fakes.
pub fn context(root: &Path, source: &Arc<FakeSource>, sink: &Arc<FakeSink>) -> MonitorContext {
    MonitorContext::new(
        StateStore::new(root),
        Arc::clone(source) as Arc<dyn ProfileSource>,
        Arc::clone(sink) as Arc<dyn MediaSink>,
    )
}
