//! Per-source deduplication against the seen-item ledger
//!
//! [`Deduplicator::diff`] is a pure read: calling it twice without a commit
//! in between returns the same items. [`Deduplicator::commit`] writes the
//! seen record for one item.

use std::collections::HashSet;

use chrono::Utc;

use super::SharedStore;
use crate::error::Result;
use crate::models::{ContentItem, SeenRecord, Source};

/// Counts from one diff, used for logging and metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupCheckResult {
    pub fetched: usize,
    pub new: usize,
}

impl DedupCheckResult {
    /// Items that were already recorded
    pub fn existing_count(&self) -> usize {
        self.fetched - self.new
    }
}

/// Filters fetched items down to the ones never recorded for their source
#[derive(Clone)]
pub struct Deduplicator {
    store: SharedStore,
}

impl Deduplicator {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// New items for `source`, oldest first
    ///
    /// Items repeated within `fetched` are returned once. Items with equal
    /// publish times keep their fetch order.
    pub async fn diff(
        &self,
        source: &Source,
        fetched: Vec<ContentItem>,
    ) -> Result<(Vec<ContentItem>, DedupCheckResult)> {
        let seen = self.store.list_seen_item_ids(source).await?;
        let fetched_count = fetched.len();

        let mut batch_ids = HashSet::with_capacity(fetched_count);
        let mut fresh: Vec<ContentItem> = fetched
            .into_iter()
            .filter(|item| !seen.contains(&item.item_id))
            .filter(|item| batch_ids.insert(item.item_id.clone()))
            .collect();

        fresh.sort_by_key(|item| item.published_at);

        let result = DedupCheckResult {
            fetched: fetched_count,
            new: fresh.len(),
        };
        Ok((fresh, result))
    }

    /// Record `item` as seen; stories carry their expiry
    ///
    /// Returns `false` if another writer recorded the item first.
    pub async fn commit(&self, item: &ContentItem) -> Result<bool> {
        let record = SeenRecord {
            source: item.source.clone(),
            item_id: item.item_id.clone(),
            first_seen_at: Utc::now(),
            expires_at: item.expires_at(),
        };
        self.store.record_seen(&record).await
    }
}
