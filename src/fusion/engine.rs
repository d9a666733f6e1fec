//! Multi-venue fair price engine
//!
//! Keeps the latest view per venue for every symbol and turns the fresh ones
//! into a fair quote: fused mid, uncertainty- and imbalance-driven half-spread,
//! inventory skew.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};

use super::kalman::{inverse_age_mean, Estimate, Measurement, NoiseModel, RecursiveEstimator};
use super::volatility::VolatilityTracker;
use super::{FairQuote, InventoryLedger};
use crate::config::{FusionConfig, FusionMode};
use crate::orderbook::VenueView;

/// Per-symbol fusion state
#[derive(Debug)]
struct SymbolState {
    /// Latest view per venue
    views: BTreeMap<String, VenueView>,
    estimator: RecursiveEstimator,
    volatility: VolatilityTracker,
}

impl SymbolState {
    fn new(config: &FusionConfig) -> Self {
        Self {
            views: BTreeMap::new(),
            estimator: RecursiveEstimator::new(config.q_process),
            volatility: VolatilityTracker::new(config.vol_halflife_s, config.ann_factor),
        }
    }
}

pub struct FairPriceEngine {
    config: FusionConfig,
    noise: NoiseModel,
    inventory: Arc<InventoryLedger>,
    symbols: HashMap<String, SymbolState>,
}

impl FairPriceEngine {
    pub fn new(config: FusionConfig, inventory: Arc<InventoryLedger>) -> Self {
        let noise = NoiseModel {
            r0: config.r0,
            r1: config.r1,
            r2: config.r2,
        };
        Self {
            config,
            noise,
            inventory,
            symbols: HashMap::new(),
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Store the latest view of `venue` for `symbol`, replacing the previous one
    pub fn update(&mut self, venue: &str, symbol: &str, view: VenueView) {
        let config = &self.config;
        self.symbols
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolState::new(config))
            .views
            .insert(venue.to_string(), view);
    }

    pub fn latest_view(&self, venue: &str, symbol: &str) -> Option<&VenueView> {
        self.symbols.get(symbol)?.views.get(venue)
    }

    /// Produce a quote from the venues fresh at `now_ns`.
    ///
    /// Returns `None` when no venue is fresh or the estimator has no state.
    pub fn quote(&mut self, symbol: &str, now_ns: u64) -> Option<FairQuote> {
        let Self {
            config,
            noise,
            inventory,
            symbols,
        } = self;

        let state = symbols.get_mut(symbol)?;
        let stale_ns = config.stale_threshold_ns();

        let fresh: Vec<&VenueView> = state
            .views
            .values()
            .filter(|v| v.is_fresh(now_ns, stale_ns) && v.mid.is_finite())
            .collect();
        if fresh.is_empty() {
            trace!(symbol = %symbol, "No fresh venues");
            return None;
        }

        let estimate: Estimate = match config.mode {
            FusionMode::Kalman => {
                let measurements: Vec<Measurement> = fresh
                    .iter()
                    .map(|v| Measurement {
                        value: v.mid,
                        variance: noise.variance(v.age_secs(now_ns), v.spread),
                    })
                    .collect();
                state.estimator.step(&measurements)?
            }
            FusionMode::InverseAge => {
                let points: Vec<(f64, f64)> =
                    fresh.iter().map(|v| (v.mid, v.age_secs(now_ns))).collect();
                inverse_age_mean(&points)?
            }
        };

        let imbalance = fresh.iter().map(|v| v.imbalance).sum::<f64>() / fresh.len() as f64;
        let venues_used: Vec<String> = fresh.iter().map(|v| v.venue.clone()).collect();

        let sigma = state.volatility.observe(estimate.value);
        let half = half_spread(config, estimate.variance, sigma, imbalance);

        let position = inventory.position(symbol);
        let skewed_mid = estimate.value - config.kappa * position;

        debug!(
            symbol = %symbol,
            fair = estimate.value,
            variance = estimate.variance,
            sigma,
            half,
            inventory = position,
            venues = venues_used.len(),
            "Fair quote"
        );

        Some(FairQuote {
            t_ns: now_ns,
            symbol: symbol.to_string(),
            mid: estimate.value,
            kalman_variance: estimate.variance,
            bid: skewed_mid - half,
            ask: skewed_mid + half,
            inventory: position,
            imbalance,
            sigma,
            venues_used,
        })
    }
}

/// `clamp(a_unc * sqrt(P + sigma^2 * h) + b_impact * |imbalance|, min_half, max_half)`
pub fn half_spread(config: &FusionConfig, variance: f64, sigma: f64, imbalance: f64) -> f64 {
    if variance.is_nan() || sigma.is_nan() || imbalance.is_nan() {
        return config.max_half;
    }
    let uncertainty = (variance.max(0.0) + sigma * sigma * config.h_secs).sqrt();
    let raw = config.a_unc * uncertainty + config.b_impact * imbalance.abs();
    if raw.is_nan() {
        return config.max_half;
    }
    raw.max(config.min_half).min(config.max_half)
}
