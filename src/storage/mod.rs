//! Persistence for subscriptions, seen items, cached media and sessions
//!
//! Business logic talks to the [`Store`] trait only. Two implementations
//! live in [`repository`]: [`SqliteStore`] for production and
//! [`MemoryStore`] for tests.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │   Poll pipeline / Deduplicator / AuthSession         │
//! └──────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!                   Store (trait)
//!                          │
//!            ┌─────────────┴─────────────┐
//!            ▼                           ▼
//!     ┌─────────────┐             ┌─────────────┐
//!     │ SqliteStore │             │ MemoryStore │
//!     └─────────────┘             └─────────────┘
//! ```

pub mod dedup;
pub mod repository;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Credentials, Platform, SeenRecord, Source, Subscription, TemporaryMedia};

pub use dedup::Deduplicator;
pub use repository::{MemoryStore, SqliteStore};

/// Storage boundary used by every other component
#[async_trait]
pub trait Store: Send + Sync {
    /// All subscriptions for one platform
    async fn list_subscriptions(&self, platform: Platform) -> Result<Vec<Subscription>>;

    /// Insert a subscription, updating mention and options if it already exists
    async fn add_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Item ids already recorded for a source
    async fn list_seen_item_ids(&self, source: &Source) -> Result<HashSet<String>>;

    /// Record a seen item; returns `false` if it was already recorded
    async fn record_seen(&self, record: &SeenRecord) -> Result<bool>;

    /// Delete seen records whose expiry is before `now`; returns the count removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Remember where a cached media link should point
    async fn cache_temporary_media(&self, media: &TemporaryMedia) -> Result<()>;

    /// Last persisted session credentials for a platform
    async fn load_session(&self, platform: Platform) -> Result<Option<Credentials>>;

    /// Persist session credentials for a platform
    async fn save_session(&self, platform: Platform, credentials: &Credentials) -> Result<()>;
}

/// Thread-safe shared store
pub type SharedStore = Arc<dyn Store>;

/// Create a shared SQLite store
pub fn create_sqlite_store(path: impl AsRef<std::path::Path>) -> Result<SharedStore> {
    Ok(Arc::new(SqliteStore::new(path)?))
}
