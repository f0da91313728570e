//! Repeating task scheduling
//!
//! Every background job (content polls per platform, story cleanup) runs as
//! a [`RepeatingTask`]: one tokio task that runs its [`CycleBody`], then
//! sleeps until the next cycle is due.
//!
//! # Timing
//!
//! ```text
//! |<---------------- interval ---------------->|
//! |<--- cycle --->|<------- sleep ------------>|<--- cycle --->| ...
//! ```
//!
//! The sleep after a cycle is `max(interval - elapsed, floor)`. Content
//! polls use a floor of `sources × per_source_delay` so that large source
//! lists slow the poll down instead of hammering the platform.
//!
//! A cycle that returns an error or panics is logged and the task re-arms
//! as usual.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::metrics;
use crate::storage::SharedStore;

// ============================================================================
// Cycle Body
// ============================================================================

/// Summary of one completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Number of sources the cycle visited
    pub sources: usize,
}

/// Work performed once per cycle
#[async_trait]
pub trait CycleBody: Send + Sync {
    async fn run_cycle(&self) -> anyhow::Result<CycleReport>;
}

/// Wait before the next cycle
pub fn next_wait(interval: Duration, elapsed: Duration, floor: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(floor)
}

/// Minimum wait for a cycle that visited `sources` sources
pub fn per_source_floor(per_source_delay: Duration, sources: usize) -> Duration {
    per_source_delay.saturating_mul(u32::try_from(sources).unwrap_or(u32::MAX))
}

// ============================================================================
// Repeating Task
// ============================================================================

/// A named cycle body run at a fixed interval
pub struct RepeatingTask {
    name: String,
    interval: Duration,
    per_source_delay: Duration,
    body: Arc<dyn CycleBody>,
    last_sources: usize,
}

impl RepeatingTask {
    pub fn new(name: impl Into<String>, interval: Duration, body: Arc<dyn CycleBody>) -> Self {
        Self {
            name: name.into(),
            interval,
            per_source_delay: Duration::ZERO,
            body,
            last_sources: 0,
        }
    }

    /// Set the per-source delay used for the wait floor
    pub fn with_per_source_delay(mut self, delay: Duration) -> Self {
        self.per_source_delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a single cycle and return how long to wait before the next one
    pub async fn run_once(&mut self) -> Duration {
        let started = Instant::now();
        let _timer = metrics::start_cycle_timer(&self.name);
        tracing::debug!(task = %self.name, "Cycle started");

        match AssertUnwindSafe(self.body.run_cycle()).catch_unwind().await {
            Ok(Ok(report)) => {
                self.last_sources = report.sources;
                tracing::info!(
                    task = %self.name,
                    sources = report.sources,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Cycle finished"
                );
            }
            Ok(Err(e)) => {
                metrics::record_cycle_failure(&self.name);
                tracing::error!(task = %self.name, error = %e, "Cycle failed");
            }
            Err(panic) => {
                metrics::record_cycle_failure(&self.name);
                tracing::error!(task = %self.name, panic = %panic_message(&*panic), "Cycle panicked");
            }
        }

        let floor = per_source_floor(self.per_source_delay, self.last_sources);
        next_wait(self.interval, started.elapsed(), floor)
    }

    /// Run cycles forever
    pub async fn run(mut self) {
        tracing::info!(task = %self.name, interval_secs = self.interval.as_secs(), "Task started");
        loop {
            let wait = self.run_once().await;
            tracing::debug!(task = %self.name, wait_ms = wait.as_millis() as u64, "Next cycle scheduled");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Story Cleanup
// ============================================================================

/// Purges seen records whose expiry has passed
pub struct StoryCleanup {
    store: SharedStore,
}

impl StoryCleanup {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CycleBody for StoryCleanup {
    async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let purged = self.store.purge_expired(Utc::now()).await?;
        metrics::record_purged(purged);
        tracing::info!(purged, "Expired story records purged");
        Ok(CycleReport::default())
    }
}
