//! Fair quote output

use serde::{Deserialize, Serialize};

/// Bid/ask around the fused fair mid, with diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairQuote {
    pub t_ns: u64,
    pub symbol: String,
    /// Fused fair mid before inventory skew
    pub mid: f64,
    pub kalman_variance: f64,
    pub bid: f64,
    pub ask: f64,
    pub inventory: f64,
    /// Average top-K imbalance across the venues used
    pub imbalance: f64,
    pub sigma: f64,
    pub venues_used: Vec<String>,
}

impl FairQuote {
    pub fn half_spread(&self) -> f64 {
        (self.ask - self.bid) / 2.0
    }

    /// Mid after inventory skew
    pub fn skewed_mid(&self) -> f64 {
        (self.ask + self.bid) / 2.0
    }
}
