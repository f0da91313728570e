//! feedrelay - Instagram and VLIVE to Discord notification relay
//!
//! Polls subscribed content sources, detects items published since the
//! previous poll, and fans formatted notifications out to every subscribed
//! Discord channel.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Platform fetchers, authenticated sessions and the poll cycle
//! - [`models`] - Core data structures and types
//! - [`storage`] - Subscription, seen-item and session persistence (SQLite)
//! - [`notifications`] - Message rendering and fan-out delivery
//! - [`scheduler`] - Repeating background tasks
//! - [`metrics`] - Prometheus instrumentation
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use feedrelay::prelude::*;
//!
//! # async fn example(
//! #     fetcher: feedrelay::crawler::SharedFetcher,
//! #     client: Arc<dyn feedrelay::notifications::DestinationClient>,
//! # ) -> anyhow::Result<()> {
//! let store = feedrelay::storage::create_sqlite_store("data/feedrelay.db")?;
//! let builder = Arc::new(NotificationBuilder::new(
//!     store.clone(),
//!     Arc::new(feedrelay::notifications::HttpCompositor::disabled()),
//!     "http://localhost:8080",
//! ));
//! let cycle = PollCycle::new(fetcher, store, builder, Arc::new(Dispatcher::new(client)));
//! RepeatingTask::new("vlive-poll", Duration::from_secs(30), Arc::new(cycle)).spawn();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Channel name under which VLIVE publishes sub-brand uploads
pub const VLIVE_SUB_BRAND: &str = "V PICK!";

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{AuthSession, PollCycle, SourceFetcher};
    pub use crate::error::{Error, ErrorCategory, RelayErrorTrait, Result};
    pub use crate::models::{ContentItem, Platform, Source, Subscription};
    pub use crate::notifications::{Dispatcher, NotificationBuilder, RenderedMessage};
    pub use crate::scheduler::{CycleBody, RepeatingTask};
    pub use crate::storage::{SharedStore, Store};
}

// Direct re-exports for convenience
pub use models::{ContentItem, Platform, Source, Subscription};
