//! Store implementations
//!
//! - [`SqliteStore`]: rusqlite-backed, one connection behind a `Mutex`
//! - [`MemoryStore`]: `RwLock<HashMap>` tables, for tests and dry runs
//!
//! # Usage
//!
//! ```rust,ignore
//! use feedrelay::storage::{MemoryStore, SqliteStore};
//!
//! // Production: use SQLite
//! let store = SqliteStore::new("data/feedrelay.db")?;
//!
//! // Testing: use in-memory tables
//! let store = MemoryStore::new();
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::Store;
use crate::error::{Error, Result};
use crate::models::{
    Credentials, Platform, SeenRecord, Source, Subscription, SubscriptionOptions, TemporaryMedia,
};

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`Store`]
///
/// The connection lock is only held for the synchronous duration of a
/// statement, never across an await point.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::with_source(
                        format!("Failed to create database directory {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::other("SQLite connection lock poisoned"))
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS subscriptions (
                    platform TEXT NOT NULL,
                    source_id TEXT NOT NULL,
                    community_id TEXT NOT NULL,
                    channel_id TEXT NOT NULL,
                    mention_role_id TEXT,
                    stories INTEGER NOT NULL DEFAULT 0,
                    sub_brand INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (platform, source_id, community_id, channel_id)
                );

                CREATE INDEX IF NOT EXISTS idx_subscriptions_platform
                    ON subscriptions(platform);

                CREATE TABLE IF NOT EXISTS seen_items (
                    platform TEXT NOT NULL,
                    source_id TEXT NOT NULL,
                    item_id TEXT NOT NULL,
                    first_seen_at TEXT NOT NULL,
                    expires_at INTEGER,
                    PRIMARY KEY (platform, source_id, item_id)
                );

                CREATE INDEX IF NOT EXISTS idx_seen_items_expires
                    ON seen_items(expires_at);

                CREATE TABLE IF NOT EXISTS temporary_media (
                    media_id TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    url TEXT NOT NULL,
                    cached_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    platform TEXT PRIMARY KEY,
                    token TEXT NOT NULL,
                    cookie TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                "#,
        )?;

        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_subscriptions(&self, platform: Platform) -> Result<Vec<Subscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, community_id, channel_id, mention_role_id, stories, sub_brand
             FROM subscriptions WHERE platform = ?1
             ORDER BY source_id, community_id, channel_id",
        )?;

        let rows = stmt.query_map(params![platform.as_str()], |row| {
            Ok(Subscription {
                platform,
                source_id: row.get(0)?,
                community_id: row.get(1)?,
                channel_id: row.get(2)?,
                mention_role_id: row.get(3)?,
                options: SubscriptionOptions {
                    stories: row.get(4)?,
                    sub_brand: row.get(5)?,
                },
            })
        })?;

        let mut subscriptions = Vec::new();
        for row in rows {
            subscriptions.push(row?);
        }
        Ok(subscriptions)
    }

    async fn add_subscription(&self, subscription: &Subscription) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO subscriptions
                    (platform, source_id, community_id, channel_id, mention_role_id, stories, sub_brand)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(platform, source_id, community_id, channel_id) DO UPDATE SET
                    mention_role_id = excluded.mention_role_id,
                    stories = excluded.stories,
                    sub_brand = excluded.sub_brand
                "#,
            params![
                subscription.platform.as_str(),
                subscription.source_id,
                subscription.community_id,
                subscription.channel_id,
                subscription.mention_role_id,
                subscription.options.stories,
                subscription.options.sub_brand,
            ],
        )?;
        Ok(())
    }

    async fn list_seen_item_ids(&self, source: &Source) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT item_id FROM seen_items WHERE platform = ?1 AND source_id = ?2")?;

        let ids = stmt
            .query_map(params![source.platform.as_str(), source.source_id], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<HashSet<_>, _>>()?;

        Ok(ids)
    }

    async fn record_seen(&self, record: &SeenRecord) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
                INSERT OR IGNORE INTO seen_items (platform, source_id, item_id, first_seen_at, expires_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            params![
                record.source.platform.as_str(),
                record.source.source_id,
                record.item_id,
                record.first_seen_at.to_rfc3339(),
                record.expires_at.map(|at| at.timestamp()),
            ],
        )?;
        Ok(inserted == 1)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM seen_items WHERE expires_at IS NOT NULL AND expires_at < ?1",
            params![now.timestamp()],
        )?;
        Ok(removed)
    }

    async fn cache_temporary_media(&self, media: &TemporaryMedia) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO temporary_media (media_id, kind, url, cached_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(media_id) DO UPDATE SET
                    kind = excluded.kind,
                    url = excluded.url,
                    cached_at = excluded.cached_at
                "#,
            params![
                media.media_id,
                media.kind.as_str(),
                media.url,
                media.cached_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn load_session(&self, platform: Platform) -> Result<Option<Credentials>> {
        let conn = self.conn()?;
        let credentials = conn
            .query_row(
                "SELECT token, cookie FROM sessions WHERE platform = ?1",
                params![platform.as_str()],
                |row| {
                    Ok(Credentials {
                        token: row.get(0)?,
                        cookie: row.get(1)?,
                        generation: 0,
                    })
                },
            )
            .optional()?;
        Ok(credentials)
    }

    async fn save_session(&self, platform: Platform, credentials: &Credentials) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO sessions (platform, token, cookie, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(platform) DO UPDATE SET
                    token = excluded.token,
                    cookie = excluded.cookie,
                    updated_at = excluded.updated_at
                "#,
            params![
                platform.as_str(),
                credentials.token,
                credentials.cookie,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// In-memory Implementation
// ============================================================================

type SubscriptionKey = (Platform, String, String, String);
type SeenKey = (Platform, String, String);

/// In-memory implementation of [`Store`]
///
/// Useful for testing without database dependencies.
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: RwLock<HashMap<SubscriptionKey, Subscription>>,
    seen: RwLock<HashMap<SeenKey, SeenRecord>>,
    media: RwLock<HashMap<String, TemporaryMedia>>,
    sessions: RwLock<HashMap<Platform, Credentials>>,
}

fn poisoned<T>(_: T) -> Error {
    Error::other("in-memory store lock poisoned")
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of seen records across all sources
    pub fn seen_len(&self) -> usize {
        self.seen.read().map(|seen| seen.len()).unwrap_or(0)
    }

    /// Cached media entry by id
    pub fn cached_media(&self, media_id: &str) -> Option<TemporaryMedia> {
        self.media
            .read()
            .ok()
            .and_then(|media| media.get(media_id).cloned())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_subscriptions(&self, platform: Platform) -> Result<Vec<Subscription>> {
        let subscriptions = self.subscriptions.read().map_err(poisoned)?;
        let mut matching: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.platform == platform)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (&a.source_id, &a.community_id, &a.channel_id).cmp(&(
                &b.source_id,
                &b.community_id,
                &b.channel_id,
            ))
        });
        Ok(matching)
    }

    async fn add_subscription(&self, subscription: &Subscription) -> Result<()> {
        let key = (
            subscription.platform,
            subscription.source_id.clone(),
            subscription.community_id.clone(),
            subscription.channel_id.clone(),
        );
        self.subscriptions
            .write()
            .map_err(poisoned)?
            .insert(key, subscription.clone());
        Ok(())
    }

    async fn list_seen_item_ids(&self, source: &Source) -> Result<HashSet<String>> {
        let seen = self.seen.read().map_err(poisoned)?;
        Ok(seen
            .values()
            .filter(|r| &r.source == source)
            .map(|r| r.item_id.clone())
            .collect())
    }

    async fn record_seen(&self, record: &SeenRecord) -> Result<bool> {
        let key = (
            record.source.platform,
            record.source.source_id.clone(),
            record.item_id.clone(),
        );
        let mut seen = self.seen.write().map_err(poisoned)?;
        if seen.contains_key(&key) {
            return Ok(false);
        }
        seen.insert(key, record.clone());
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut seen = self.seen.write().map_err(poisoned)?;
        let before = seen.len();
        seen.retain(|_, record| !record.is_expired(now));
        Ok(before - seen.len())
    }

    async fn cache_temporary_media(&self, media: &TemporaryMedia) -> Result<()> {
        self.media
            .write()
            .map_err(poisoned)?
            .insert(media.media_id.clone(), media.clone());
        Ok(())
    }

    async fn load_session(&self, platform: Platform) -> Result<Option<Credentials>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(&platform).cloned())
    }

    async fn save_session(&self, platform: Platform, credentials: &Credentials) -> Result<()> {
        self.sessions
            .write()
            .map_err(poisoned)?
            .insert(platform, credentials.clone());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
