//! Signed position per symbol
//!
//! Written by fill processing, read by the fair price engine. Reads return a
//! copy taken under a short-lived lock.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Side of one of our own fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillSide {
    /// We bought: position increases
    Buy,
    /// We sold: position decreases
    Sell,
}

#[derive(Debug, Default)]
pub struct InventoryLedger {
    positions: RwLock<HashMap<String, f64>>,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position, 0 for unknown symbols
    pub fn position(&self, symbol: &str) -> f64 {
        self.positions.read().get(symbol).copied().unwrap_or(0.0)
    }

    /// Apply a fill of `quantity` (absolute) on `side`; returns the new position
    pub fn apply_fill(&self, symbol: &str, quantity: f64, side: FillSide) -> f64 {
        let delta = match side {
            FillSide::Buy => quantity.abs(),
            FillSide::Sell => -quantity.abs(),
        };
        let mut positions = self.positions.write();
        let position = positions.entry(symbol.to_string()).or_insert(0.0);
        *position += delta;
        *position
    }

    /// Overwrite a position, e.g. after reconciliation with the venue
    pub fn set_position(&self, symbol: &str, position: f64) {
        self.positions.write().insert(symbol.to_string(), position);
    }

    /// Point-in-time copy of all positions
    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.positions.read().clone()
    }
}
