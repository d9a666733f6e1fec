//! Normalized top-of-book view

use serde::{Deserialize, Serialize};

use super::Level;

/// Point-in-time view of one venue's book, owned by whoever reads it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueView {
    pub venue: String,
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// (bid + ask) / 2
    pub mid: f64,
    pub spread: f64,
    /// Top-K depth imbalance in [-1, 1]
    pub imbalance: f64,
    /// Monotonic arrival time (ns) of the event that produced this view
    pub arrival_ns: u64,
    pub last_update_id: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

impl VenueView {
    /// Age in seconds relative to `now_ns`; views from the future count as fresh
    pub fn age_secs(&self, now_ns: u64) -> f64 {
        now_ns.saturating_sub(self.arrival_ns) as f64 / 1e9
    }

    pub fn is_fresh(&self, now_ns: u64, stale_threshold_ns: u64) -> bool {
        now_ns.saturating_sub(self.arrival_ns) <= stale_threshold_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(arrival_ns: u64) -> VenueView {
        VenueView {
            venue: "okx".to_string(),
            symbol: "BTCUSDT".to_string(),
            bid: 99.0,
            ask: 101.0,
            mid: 100.0,
            spread: 2.0,
            imbalance: 0.0,
            arrival_ns,
            last_update_id: 0,
            bids: vec![],
            asks: vec![],
        }
    }

    #[test]
    fn test_freshness_boundary() {
        let v = view(1_000_000_000);
        assert!(v.is_fresh(1_500_000_000, 500_000_000));
        assert!(!v.is_fresh(1_500_000_001, 500_000_000));
        assert!(v.is_fresh(0, 500_000_000));
        assert!((v.age_secs(1_200_000_000) - 0.2).abs() < 1e-12);
    }
}
