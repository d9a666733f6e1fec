//! Fair Quote - multi-venue book synchronization and fair price engine
//!
//! Keeps one order book per venue and symbol in sync with its exchange feed,
//! fuses the fresh venue mids into a fair value with a recursive estimator and
//! quotes a bid/ask around it, widened for uncertainty and skewed by inventory.

use std::sync::Arc;

pub mod clock;
pub mod config;
pub mod error;
pub mod fusion;
pub mod orderbook;
pub mod parser;
pub mod pipeline;
pub mod publisher;
pub mod snapshot;
pub mod sync;
pub mod telemetry;
pub mod websocket;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Config, FusionConfig, FusionMode};
pub use error::{MarketDataError, Result};
pub use fusion::{FairPriceEngine, FairQuote, InventoryLedger};
pub use orderbook::{VenueBook, VenueView};
pub use pipeline::{QuoteConsumer, VenueUpdate};
pub use publisher::{Publisher, QuoteSink};
pub use sync::{BookProtocol, BookSynchronizer, SyncState, SyncStatus};

/// Application state shared with the HTTP endpoints
pub struct AppState {
    pub config: Arc<Config>,
    pub status: Arc<SyncStatus>,
    pub inventory: Arc<InventoryLedger>,
    pub registry: prometheus::Registry,
}
