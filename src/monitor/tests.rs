#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use super::*;
use crate::error::{FetchError, WatchError};
use crate::test_utils::{FakeSink, FakeSource, attributes, context, media_set};

const T1: &str = "2024-05-01 10:00:00";
const T2: &str = "2024-05-01 10:30:00";

struct Harness {
    dir: tempfile::TempDir,
    source: Arc<FakeSource>,
    sink: Arc<FakeSink>,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            source: Arc::new(FakeSource::new()),
            sink: Arc::new(FakeSink::new()),
        }
    }

    fn monitor(&self, entity: &str) -> EntityMonitor {
        EntityMonitor::new(entity, context(self.dir.path(), &self.source, &self.sink))
    }

    fn monitor_with(&self, entity: &str, options: MonitorOptions) -> EntityMonitor {
        EntityMonitor::new(
            entity,
            context(self.dir.path(), &self.source, &self.sink).with_options(options),
        )
    }

    fn store(&self) -> StateStore {
        StateStore::new(self.dir.path())
    }

    fn log(&self, entity: &str) -> MetadataLog {
        MetadataLog::load(self.store().metadata_path(entity)).unwrap()
    }
}

#[tokio::test]
async fn first_cycle_records_everything_new() {
    let h = Harness::new();
    h.source
        .set_profile("alice", attributes(&["bob", "carol"], &["bob", "dave"]));
    h.source.set_media(
        "alice",
        Category::Highlights,
        vec![media_set("h1", 2), media_set("h2", 1)],
    );

    let mut monitor = h.monitor("alice");
    let report = monitor.run_once_at(T1).await.unwrap();

    assert_eq!(monitor.phase(), CyclePhase::Done);
    assert_eq!(report.new_sets[&Category::Highlights], vec!["h1", "h2"]);
    assert!(report.new_sets[&Category::Stories].is_empty());
    assert_eq!(report.failed_downloads, 0);
    assert_eq!(report.not_following_back, vec!["dave"]);
    assert_eq!(report.profile_snapshot, Some(true));

    let state = h.store().load("alice").unwrap();
    assert_eq!(state.highlights.ids(), ["h1", "h2"]);
    assert!(state.stories.is_empty());
    assert_eq!(state.snapshot.len(), 1);
    assert_eq!(state.snapshot[T1].followers_count, 2);
    assert_eq!(state.profile_id.as_deref(), Some("1001"));

    let log = h.log("alice");
    let highlights = log.entry(Category::Highlights, T1).unwrap();
    assert_eq!(highlights.len(), 2);
    assert!(highlights["h1"].fully_downloaded());
    assert!(log.entry(Category::Stories, T1).unwrap().is_empty());

    assert_eq!(h.sink.downloaded(), vec!["h1-0", "h1-1", "h2-0"]);
    assert_eq!(h.sink.snapshot_count(), 1);
}

#[tokio::test]
async fn second_cycle_without_changes_downloads_nothing() {
    let h = Harness::new();
    h.source.set_profile("alice", attributes(&["bob"], &["bob"]));
    h.source
        .set_media("alice", Category::Highlights, vec![media_set("h1", 1)]);
    let mut monitor = h.monitor("alice");

    monitor.run_once_at(T1).await.unwrap();
    let report = monitor.run_once_at(T2).await.unwrap();

    assert_eq!(report.new_set_count(), 0);
    assert_eq!(h.sink.downloaded(), vec!["h1-0"]);

    let state = h.store().load("alice").unwrap();
    assert_eq!(state.highlights.ids(), ["h1"]);
    assert_eq!(state.snapshot.len(), 2);

    let log = h.log("alice");
    assert_eq!(
        log.timestamps(Category::Highlights).collect::<Vec<_>>(),
        vec![T1, T2]
    );
    assert!(log.entry(Category::Highlights, T2).unwrap().is_empty());
}

#[tokio::test]
async fn fetch_failure_leaves_state_untouched() {
    let h = Harness::new();
    h.source.set_profile("alice", attributes(&["bob"], &[]));
    h.source
        .set_media("alice", Category::Highlights, vec![media_set("h1", 1)]);
    let mut monitor = h.monitor("alice");
    monitor.run_once_at(T1).await.unwrap();
    let before = h.store().load("alice").unwrap();

    h.source
        .set_media("alice", Category::Highlights, vec![media_set("h2", 1)]);
    h.source
        .fail_next("alice", FetchError::Network("connection refused".to_owned()));
    let err = monitor.run_once_at(T2).await.unwrap_err();

    assert!(matches!(err, WatchError::Fetch(FetchError::Network(_))), "got {err}");
    assert_eq!(monitor.phase(), CyclePhase::Failed);
    assert_eq!(h.store().load("alice").unwrap(), before);
    assert!(h.log("alice").entry(Category::Highlights, T2).is_none());
    assert_eq!(h.sink.downloaded(), vec!["h1-0"]);
}

#[tokio::test]
async fn failed_download_is_retried_next_cycle() {
    let h = Harness::new();
    h.source
        .set_media("alice", Category::Stories, vec![media_set("s1", 2)]);
    h.sink.fail_media("s1-1");
    let mut monitor = h.monitor("alice");

    let first = monitor.run_once_at(T1).await.unwrap();
    assert_eq!(first.failed_downloads, 1);
    assert!(h.store().load("alice").unwrap().stories.is_empty());
    let logged = h.log("alice");
    let record = &logged.entry(Category::Stories, T1).unwrap()["s1"];
    assert!(record.items[0].downloaded);
    assert!(!record.items[1].downloaded);

    h.sink.heal();
    let second = monitor.run_once_at(T2).await.unwrap();
    assert_eq!(second.new_sets[&Category::Stories], vec!["s1"]);
    assert_eq!(second.failed_downloads, 0);
    assert_eq!(h.store().load("alice").unwrap().stories.ids(), ["s1"]);
}

#[tokio::test]
async fn profile_snapshot_failure_does_not_fail_cycle() {
    let h = Harness::new();
    h.sink.fail_snapshots();
    let mut monitor = h.monitor("alice");

    let report = monitor.run_once_at(T1).await.unwrap();

    assert_eq!(report.profile_snapshot, Some(false));
    assert_eq!(monitor.phase(), CyclePhase::Done);
    assert_eq!(h.store().load("alice").unwrap().snapshot.len(), 1);
}

#[tokio::test]
async fn disabled_categories_and_snapshot_are_skipped() {
    let h = Harness::new();
    h.source
        .set_media("alice", Category::Highlights, vec![media_set("h1", 1)]);
    h.source
        .set_media("alice", Category::Stories, vec![media_set("s1", 1)]);
    let options = MonitorOptions {
        categories: vec![Category::Stories],
        snapshot_profile: false,
    };
    let mut monitor = h.monitor_with("alice", options);

    let report = monitor.run_once_at(T1).await.unwrap();

    assert!(!report.new_sets.contains_key(&Category::Highlights));
    assert_eq!(report.profile_snapshot, None);
    assert_eq!(h.sink.snapshot_count(), 0);
    assert_eq!(h.sink.downloaded(), vec!["s1-0"]);
    assert!(h.log("alice").entry(Category::Highlights, T1).is_none());
}

#[tokio::test]
async fn malformed_metadata_fails_before_fetching() {
    let h = Harness::new();
    let path = h.store().metadata_path("alice");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();
    let mut monitor = h.monitor("alice");

    let err = monitor.run_once_at(T1).await.unwrap_err();

    assert!(matches!(err, WatchError::Persistence { .. }), "got {err}");
    assert_eq!(h.source.calls("alice"), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

#[tokio::test]
async fn duplicate_sets_in_one_fetch_are_processed_once() {
    let h = Harness::new();
    h.source.set_media(
        "alice",
        Category::Highlights,
        vec![media_set("h1", 1), media_set("h1", 1)],
    );
    let mut monitor = h.monitor("alice");

    let report = monitor.run_once_at(T1).await.unwrap();

    assert_eq!(report.new_sets[&Category::Highlights], vec!["h1"]);
    assert_eq!(h.sink.downloaded(), vec!["h1-0"]);
}

#[tokio::test]
async fn profile_id_follows_latest_cycle() {
    let h = Harness::new();
    h.source.set_profile("alice", attributes(&[], &[]));
    let mut monitor = h.monitor("alice");
    monitor.run_once_at(T1).await.unwrap();

    let mut renamed = attributes(&[], &[]);
    renamed.user_id = "2002".to_owned();
    h.source.set_profile("alice", renamed);
    monitor.run_once_at(T2).await.unwrap();

    assert_eq!(
        h.store().load("alice").unwrap().profile_id.as_deref(),
        Some("2002")
    );
}
