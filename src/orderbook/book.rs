//! Core venue book implementation
//!
//! Uses BTreeMap for efficient sorted price level management.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{DiffEvent, Level, Side, VenueView};
use crate::error::{MarketDataError, Result};
use crate::parser::PriceLevel;

/// Result of offering a diff to the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    Applied,
    /// Already covered by the current state (`final_update_id <= last_update_id`)
    Stale,
}

/// Order book for one venue and symbol
#[derive(Debug)]
pub struct VenueBook {
    venue: String,
    symbol: String,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Last processed update ID
    last_update_id: u64,
    /// Whether the book has been initialized with a snapshot
    initialized: bool,
    /// Maximum depth levels to maintain
    max_depth: usize,
    /// Levels used for imbalance and the published depth
    top_k: usize,
    /// Arrival time of the last applied event
    arrival_ns: u64,
}

impl VenueBook {
    /// Create a new empty book
    pub fn new(venue: &str, symbol: &str, max_depth: usize, top_k: usize) -> Self {
        Self {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            initialized: false,
            max_depth: max_depth.max(top_k),
            top_k,
            arrival_ns: 0,
        }
    }

    /// Replace all levels with an authoritative snapshot
    pub fn load_snapshot(&mut self, last_update_id: u64, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.replace_levels(bids, asks);
        self.last_update_id = last_update_id;
        self.arrival_ns = 0;
        self.initialized = true;
    }

    /// Replace the top levels wholesale (feeds without a diff stream).
    /// No sequence checking applies.
    pub fn apply_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel], arrival_ns: u64) {
        self.replace_levels(bids, asks);
        self.arrival_ns = arrival_ns;
        self.initialized = true;
    }

    /// Apply a sequenced diff
    ///
    /// Stale events are ignored. An event starting past `last_update_id + 1`
    /// fails with [`MarketDataError::SequenceGap`] and leaves the book untouched.
    pub fn apply_diff(&mut self, event: &DiffEvent) -> Result<DiffOutcome> {
        if !self.initialized {
            return Err(MarketDataError::OrderBookError(format!(
                "{}:{} diff before snapshot",
                self.venue, self.symbol
            )));
        }

        if event.final_update_id <= self.last_update_id {
            return Ok(DiffOutcome::Stale);
        }

        let expected = self.last_update_id.saturating_add(1);
        if event.first_update_id > expected {
            return Err(MarketDataError::SequenceGap {
                expected,
                got: event.first_update_id,
            });
        }

        for level in &event.bids {
            self.update_side(Side::Bid, level);
        }
        for level in &event.asks {
            self.update_side(Side::Ask, level);
        }

        self.last_update_id = event.final_update_id;
        self.arrival_ns = event.arrival_ns;
        self.trim_depth();

        Ok(DiffOutcome::Applied)
    }

    /// Drop all state; the next snapshot starts from scratch
    pub fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_update_id = 0;
        self.arrival_ns = 0;
        self.initialized = false;
    }

    fn replace_levels(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids.clear();
        self.asks.clear();

        for level in bids {
            if level.quantity > Decimal::ZERO {
                self.bids.insert(Reverse(level.price), level.quantity);
            }
        }
        for level in asks {
            if level.quantity > Decimal::ZERO {
                self.asks.insert(level.price, level.quantity);
            }
        }

        self.trim_depth();
    }

    /// Update a single price level; zero quantity removes it
    fn update_side(&mut self, side: Side, level: &PriceLevel) {
        let remove = level.quantity <= Decimal::ZERO;
        match side {
            Side::Bid => {
                if remove {
                    self.bids.remove(&Reverse(level.price));
                } else {
                    self.bids.insert(Reverse(level.price), level.quantity);
                }
            }
            Side::Ask => {
                if remove {
                    self.asks.remove(&level.price);
                } else {
                    self.asks.insert(level.price, level.quantity);
                }
            }
        }
    }

    /// Trim the book to max depth
    fn trim_depth(&mut self) {
        while self.bids.len() > self.max_depth {
            self.bids.pop_last();
        }
        while self.asks.len() > self.max_depth {
            self.asks.pop_last();
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Best bid above best ask
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid > ask)
    }

    /// `(bid_qty - ask_qty) / (bid_qty + ask_qty)` over the top `levels`, 0 when both are empty
    pub fn imbalance(&self, levels: usize) -> Decimal {
        let bid_volume: Decimal = self.bids.values().take(levels).sum();
        let ask_volume: Decimal = self.asks.values().take(levels).sum();

        let total = bid_volume + ask_volume;
        if total > Decimal::ZERO {
            (bid_volume - ask_volume) / total
        } else {
            Decimal::ZERO
        }
    }

    /// Levels of one side, best first, limited to `limit`
    pub fn levels(&self, side: Side, limit: usize) -> Vec<Level> {
        match side {
            Side::Bid => self
                .bids
                .iter()
                .take(limit)
                .map(|(Reverse(p), q)| Level {
                    price: *p,
                    quantity: *q,
                })
                .collect(),
            Side::Ask => self
                .asks
                .iter()
                .take(limit)
                .map(|(p, q)| Level {
                    price: *p,
                    quantity: *q,
                })
                .collect(),
        }
    }

    /// Normalized top-of-book view; `None` when a side is empty or the book is crossed
    pub fn view(&self) -> Option<VenueView> {
        let best_bid = self.best_bid()?;
        let best_ask = self.best_ask()?;
        if best_bid > best_ask {
            return None;
        }

        let bid = best_bid.to_f64()?;
        let ask = best_ask.to_f64()?;

        Some(VenueView {
            venue: self.venue.clone(),
            symbol: self.symbol.clone(),
            bid,
            ask,
            mid: (bid + ask) / 2.0,
            spread: ask - bid,
            imbalance: self.imbalance(self.top_k).to_f64().unwrap_or(0.0),
            arrival_ns: self.arrival_ns,
            last_update_id: self.last_update_id,
            bids: self.levels(Side::Bid, self.top_k),
            asks: self.levels(Side::Ask, self.top_k),
        })
    }

    /// Check if the book is initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Get last update ID
    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    pub fn arrival_ns(&self) -> u64 {
        self.arrival_ns
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}
