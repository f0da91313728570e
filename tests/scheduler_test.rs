//! Scheduler tests on paused tokio time

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use feedrelay::models::{Platform, SeenRecord, Source};
use feedrelay::scheduler::{CycleBody, CycleReport, RepeatingTask, StoryCleanup};
use feedrelay::storage::{MemoryStore, Store};
use tokio::time::Instant;

/// Fails on the first cycle, panics on the second, then succeeds
struct Flaky {
    runs: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

#[async_trait]
impl CycleBody for Flaky {
    async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        self.started.lock().unwrap().push(Instant::now());
        match self.runs.fetch_add(1, Ordering::SeqCst) {
            0 => anyhow::bail!("platform unavailable"),
            1 => panic!("unexpected payload"),
            _ => Ok(CycleReport { sources: 1 }),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_cycles_rearm() {
    let body = Arc::new(Flaky {
        runs: AtomicUsize::new(0),
        started: Mutex::new(Vec::new()),
    });
    let origin = Instant::now();
    let handle = RepeatingTask::new("flaky", Duration::from_secs(60), body.clone()).spawn();

    tokio::time::sleep(Duration::from_secs(150)).await;

    assert_eq!(body.runs.load(Ordering::SeqCst), 3);
    let offsets: Vec<u64> = body
        .started
        .lock()
        .unwrap()
        .iter()
        .map(|at| at.duration_since(origin).as_secs())
        .collect();
    assert_eq!(offsets, vec![0, 60, 120]);

    handle.abort();
}

/// Slow cycles on many sources stretch the wait to the per-source floor
#[tokio::test(start_paused = true)]
async fn test_per_source_floor_stretches_interval() {
    struct ManySources(AtomicUsize);

    #[async_trait]
    impl CycleBody for ManySources {
        async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(CycleReport { sources: 25 })
        }
    }

    let body = Arc::new(ManySources(AtomicUsize::new(0)));
    let handle = RepeatingTask::new("instagram-poll", Duration::from_secs(60), body.clone())
        .with_per_source_delay(Duration::from_secs(4))
        .spawn();

    // 25 sources × 4s = 100s between cycles
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(body.0.load(Ordering::SeqCst), 2);

    handle.abort();
}

#[tokio::test]
async fn test_story_cleanup_purges_expired_records() {
    let store = Arc::new(MemoryStore::default());
    let source = Source::new(Platform::Instagram, "1234");
    let now = Utc::now();

    for (item_id, expires_at) in [
        ("expired", Some(now - ChronoDuration::hours(1))),
        ("live", Some(now + ChronoDuration::hours(1))),
        ("post", None),
    ] {
        store
            .record_seen(&SeenRecord {
                source: source.clone(),
                item_id: item_id.to_string(),
                first_seen_at: now - ChronoDuration::hours(25),
                expires_at,
            })
            .await
            .unwrap();
    }

    let report = StoryCleanup::new(store.clone()).run_cycle().await.unwrap();
    assert_eq!(report.sources, 0);

    let remaining = store.list_seen_item_ids(&source).await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(!remaining.contains("expired"));
}
