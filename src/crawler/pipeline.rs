//! Content poll cycle
//!
//! One [`PollCycle`] drives one platform. Each cycle spawns an independent
//! task per (source, feed) pair and waits for all of them:
//!
//! ```text
//!                         ┌──────────────────────┐
//!                         │  list_subscriptions  │
//!                         │   grouped by source  │
//!                         └──────────┬───────────┘
//!              ┌─────────────────────┼─────────────────────┐
//!              ▼                     ▼                     ▼
//!     ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐
//!     │ source A / feed │   │ source A / feed │   │ source B / feed │
//!     └────────┬────────┘   └────────┬────────┘   └────────┬────────┘
//!              │ fetch → diff → commit → render → dispatch │
//!              ▼                     ▼                     ▼
//!                      join, log failures per task
//! ```
//!
//! Items are recorded as seen before any notification goes out, so a crash
//! between the two loses a notification rather than duplicating it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};

use super::{FeedKind, SharedFetcher};
use crate::error::{Error, ErrorCategory, RelayErrorTrait, Result};
use crate::metrics;
use crate::models::{ContentItem, OwnerProfile, Platform, Source, Subscription};
use crate::notifications::{Dispatcher, NotificationBuilder};
use crate::scheduler::{CycleBody, CycleReport};
use crate::storage::{Deduplicator, SharedStore};
use crate::utils::error::FetchError;

/// Owner profiles looked up during one cycle, one cell per source
type ProfileCache = Mutex<HashMap<Source, Arc<OnceCell<Option<OwnerProfile>>>>>;

/// Per-feed counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedOutcome {
    pub fetched: usize,
    pub new: usize,
    pub notified: usize,
}

struct PollContext {
    fetcher: SharedFetcher,
    store: SharedStore,
    dedup: Deduplicator,
    builder: Arc<NotificationBuilder>,
    dispatcher: Arc<Dispatcher>,
}

/// Cycle body polling every subscribed source of one platform
pub struct PollCycle {
    ctx: Arc<PollContext>,
}

impl PollCycle {
    pub fn new(
        fetcher: SharedFetcher,
        store: SharedStore,
        builder: Arc<NotificationBuilder>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            ctx: Arc::new(PollContext {
                fetcher,
                dedup: Deduplicator::new(store.clone()),
                store,
                builder,
                dispatcher,
            }),
        }
    }

    pub fn platform(&self) -> Platform {
        self.ctx.fetcher.platform()
    }
}

#[async_trait]
impl CycleBody for PollCycle {
    async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let platform = self.platform();
        let subscriptions = self.ctx.store.list_subscriptions(platform).await?;

        let mut by_source: BTreeMap<Source, Vec<Subscription>> = BTreeMap::new();
        for subscription in subscriptions {
            by_source
                .entry(subscription.source())
                .or_default()
                .push(subscription);
        }
        let sources = by_source.len();

        let profiles: Arc<ProfileCache> = Arc::default();
        let mut handles = Vec::new();

        for (source, subscriptions) in by_source {
            let subscriptions = Arc::new(subscriptions);
            for &feed in self.ctx.fetcher.feeds() {
                let ctx = self.ctx.clone();
                let task_source = source.clone();
                let subscriptions = subscriptions.clone();
                let profiles = profiles.clone();

                let handle = tokio::spawn(async move {
                    let source = task_source;
                    match ctx.poll_feed(&source, feed, &subscriptions, &profiles).await {
                        Ok(outcome) if outcome.new > 0 => tracing::info!(
                            source = %source,
                            feed = %feed,
                            fetched = outcome.fetched,
                            new = outcome.new,
                            notified = outcome.notified,
                            "Feed polled"
                        ),
                        Ok(_) => tracing::debug!(source = %source, feed = %feed, "No new items"),
                        Err(e) => report_failure(platform, &source, feed, &e),
                    }
                });
                handles.push((source.clone(), feed, handle));
            }
        }

        for (source, feed, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(source = %source, feed = %feed, error = %e, "Poll task aborted");
            }
        }

        Ok(CycleReport { sources })
    }
}

impl PollContext {
    async fn poll_feed(
        &self,
        source: &Source,
        feed: FeedKind,
        subscriptions: &[Subscription],
        profiles: &ProfileCache,
    ) -> Result<FeedOutcome> {
        let platform = source.platform.as_str();
        let fetched = self.fetcher.fetch(source, feed).await?;
        let (fresh, counts) = self.dedup.diff(source, fetched).await?;
        metrics::record_dedup_results(platform, counts.new, counts.existing_count());

        let mut outcome = FeedOutcome {
            fetched: counts.fetched,
            new: counts.new,
            notified: 0,
        };

        for item in fresh {
            match self.dedup.commit(&item).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(source = %source, item = %item.item_id, "Already recorded");
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        source = %source,
                        item = %item.item_id,
                        error = %e,
                        "Failed to record item, skipping notification"
                    );
                    continue;
                }
            }

            if !item.is_notifiable() {
                tracing::debug!(source = %source, item = %item.item_id, "Recorded without notification");
                continue;
            }

            let profile = self.owner_profile(source, &item, profiles).await;
            let message = self.builder.render(&item, profile.as_ref()).await;
            let report = self.dispatcher.dispatch(&item, &message, subscriptions).await;
            tracing::debug!(
                source = %source,
                item = %item.item_id,
                subscriptions = report.total(),
                delivered = report.delivered,
                "Item dispatched"
            );
            if report.delivered > 0 {
                outcome.notified += 1;
            }
        }

        Ok(outcome)
    }

    /// Profile for the item's owner, fetched at most once per source per
    /// cycle unless the lookup fails
    ///
    /// Feeds of the same source share one cell, so a concurrent lookup waits
    /// for the first instead of issuing its own request.
    async fn owner_profile(
        &self,
        source: &Source,
        item: &ContentItem,
        profiles: &ProfileCache,
    ) -> Option<OwnerProfile> {
        let cell = profiles.lock().await.entry(source.clone()).or_default().clone();

        match cell
            .get_or_try_init(|| self.fetcher.owner_profile(source, item))
            .await
        {
            Ok(profile) => profile.clone(),
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "Owner profile lookup failed");
                None
            }
        }
    }
}

fn report_failure(platform: Platform, source: &Source, feed: FeedKind, error: &Error) {
    if let Error::Fetch(e) = error {
        metrics::record_fetch_error(platform.as_str(), e.kind());
    }

    let category = error.category();
    match error {
        Error::Fetch(FetchError::AuthRetriesExhausted { attempts }) => tracing::error!(
            source = %source,
            feed = %feed,
            attempts,
            "Could not authorize after repeated logins, skipping source"
        ),
        Error::Fetch(FetchError::RateLimited) => {
            tracing::warn!(source = %source, feed = %feed, "Rate limited, skipping this cycle")
        }
        _ if error.is_recoverable() || category == ErrorCategory::Parsing => tracing::warn!(
            source = %source,
            feed = %feed,
            category = category.as_str(),
            error = %error,
            "Poll failed"
        ),
        _ => tracing::error!(
            source = %source,
            feed = %feed,
            category = category.as_str(),
            error = %error,
            "Poll failed"
        ),
    }
}
