//! Order book module
//!
//! Per-venue book state built from snapshots and sequenced diffs, and the
//! normalized top-of-book view handed to the fusion engine.

mod book;
mod view;

pub use book::{DiffOutcome, VenueBook};
pub use view::VenueView;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::parser::{DepthUpdate, PriceLevel};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// A single level in the order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Sequenced diff stamped with its local arrival time
#[derive(Debug, Clone)]
pub struct DiffEvent {
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// Monotonic arrival timestamp (ns)
    pub arrival_ns: u64,
}

impl DiffEvent {
    pub fn from_update(update: DepthUpdate, arrival_ns: u64) -> Self {
        Self {
            first_update_id: update.first_update_id,
            final_update_id: update.final_update_id,
            bids: update.bids,
            asks: update.asks,
            arrival_ns,
        }
    }

    /// True when this event bridges a book at `last_update_id` to the live stream
    pub fn bridges(&self, last_update_id: u64) -> bool {
        match last_update_id.checked_add(1) {
            Some(next) => self.first_update_id <= next && next <= self.final_update_id,
            None => false,
        }
    }
}
