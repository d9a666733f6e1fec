//! Book synchronization
//!
//! One [`BookSynchronizer`] per venue and symbol reconciles a snapshot source
//! with the live feed and hands normalized views to the fusion consumer.

mod buffer;
mod synchronizer;

pub use buffer::PendingDiffs;
pub use synchronizer::{BookSynchronizer, SyncContext};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::{Config, FusionConfig};
use crate::error::Result;
use crate::parser::{OrderBookSnapshot, ParsedMessage};

/// Out-of-band source of authoritative book snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self, symbol: &str, limit: usize) -> Result<OrderBookSnapshot>;
}

/// Opens a fresh connection to a venue feed
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FeedStream>>;
}

/// An open feed connection
#[async_trait]
pub trait FeedStream: Send {
    /// Next message from the feed.
    ///
    /// `Ok(None)` means a frame was consumed that carries no market data
    /// (control frames, unparseable payloads). An error ends the connection.
    async fn next_message(&mut self) -> Result<Option<ParsedMessage>>;
}

/// How a venue's book is kept in sync
#[derive(Clone)]
pub enum BookProtocol {
    /// Sequenced diff stream reconciled against REST snapshots
    DiffSequenced { snapshots: Arc<dyn SnapshotSource> },
    /// Periodic top-K snapshots on the stream, no sequence checking
    SnapshotOnly,
}

impl BookProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            BookProtocol::DiffSequenced { .. } => "diff_sequenced",
            BookProtocol::SnapshotOnly => "snapshot_only",
        }
    }
}

/// Synchronizer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Connecting,
    /// Diffs are collected while the snapshot is outstanding
    Buffering,
    AwaitingSnapshot,
    /// Snapshot loaded; waiting for the diff that bridges it to the stream
    GateWait,
    Synced,
}

/// Per-feed entry on the status board
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub venue: String,
    pub symbol: String,
    pub state: SyncState,
    pub resyncs: u64,
}

/// Shared view of every synchronizer's state, read by the health endpoint.
/// Each synchronizer only writes its own entry.
#[derive(Debug, Default)]
pub struct SyncStatus {
    feeds: RwLock<BTreeMap<String, FeedStatus>>,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(venue: &str, symbol: &str) -> String {
        format!("{}:{}", venue, symbol)
    }

    pub fn set_state(&self, venue: &str, symbol: &str, state: SyncState) {
        let mut feeds = self.feeds.write();
        feeds
            .entry(Self::key(venue, symbol))
            .and_modify(|f| f.state = state)
            .or_insert_with(|| FeedStatus {
                venue: venue.to_string(),
                symbol: symbol.to_string(),
                state,
                resyncs: 0,
            });
    }

    pub fn record_resync(&self, venue: &str, symbol: &str) {
        if let Some(feed) = self.feeds.write().get_mut(&Self::key(venue, symbol)) {
            feed.resyncs += 1;
        }
    }

    pub fn get(&self, venue: &str, symbol: &str) -> Option<FeedStatus> {
        self.feeds.read().get(&Self::key(venue, symbol)).cloned()
    }

    pub fn snapshot(&self) -> Vec<FeedStatus> {
        self.feeds.read().values().cloned().collect()
    }

    /// True when every registered feed is synced
    pub fn all_synced(&self) -> bool {
        let feeds = self.feeds.read();
        !feeds.is_empty() && feeds.values().all(|f| f.state == SyncState::Synced)
    }
}

/// Tuning shared by all synchronizers
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Depth requested from the snapshot source
    pub snapshot_depth: usize,
    /// Levels kept per book side
    pub book_depth: usize,
    pub top_k: usize,
    pub snapshot_timeout: Duration,
    pub snapshot_retry_delay: Duration,
    pub max_snapshot_attempts: u32,
    pub max_pending_diffs: usize,
    pub reconnect_delay: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &Config, fusion: &FusionConfig) -> Self {
        Self {
            snapshot_depth: config.snapshot_depth,
            book_depth: config.book_depth,
            top_k: fusion.top_k,
            snapshot_timeout: config.snapshot_timeout(),
            snapshot_retry_delay: config.snapshot_retry_delay(),
            max_snapshot_attempts: config.max_snapshot_attempts,
            max_pending_diffs: config.max_pending_diffs,
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default(), &FusionConfig::default())
    }
}
