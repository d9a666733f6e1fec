//! Logging initialisation and prometheus metrics

use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Install the JSON tracing subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into()));

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(filter)
        .init();
}

/// Counters and gauges exported on `/metrics`
#[derive(Clone)]
pub struct Metrics {
    pub diffs_applied: IntCounterVec,
    pub sequence_gaps: IntCounterVec,
    pub resyncs: IntCounterVec,
    pub stale_snapshots: IntCounterVec,
    pub crossed_books: IntCounterVec,
    pub quotes: IntCounterVec,
    pub no_quote: IntCounterVec,
    pub fair_mid: GaugeVec,
    pub half_spread: GaugeVec,
}

impl Metrics {
    /// Create the metric set and register it with `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let feed = &["venue", "symbol"];
        let sym = &["symbol"];

        let metrics = Self {
            diffs_applied: IntCounterVec::new(
                Opts::new("fairquote_diffs_applied_total", "Diff events applied to books"),
                feed,
            )?,
            sequence_gaps: IntCounterVec::new(
                Opts::new("fairquote_sequence_gaps_total", "Sequence gaps detected"),
                feed,
            )?,
            resyncs: IntCounterVec::new(
                Opts::new("fairquote_resyncs_total", "Full synchronizer restarts"),
                feed,
            )?,
            stale_snapshots: IntCounterVec::new(
                Opts::new(
                    "fairquote_stale_snapshots_total",
                    "Snapshots discarded as older than the buffered stream",
                ),
                feed,
            )?,
            crossed_books: IntCounterVec::new(
                Opts::new("fairquote_crossed_books_total", "Updates leaving a crossed book"),
                feed,
            )?,
            quotes: IntCounterVec::new(
                Opts::new("fairquote_quotes_total", "Fair quotes produced"),
                sym,
            )?,
            no_quote: IntCounterVec::new(
                Opts::new("fairquote_no_quote_total", "Quote requests with no fresh venue"),
                sym,
            )?,
            fair_mid: GaugeVec::new(Opts::new("fairquote_fair_mid", "Latest fair mid"), sym)?,
            half_spread: GaugeVec::new(
                Opts::new("fairquote_half_spread", "Latest quoted half-spread"),
                sym,
            )?,
        };

        registry.register(Box::new(metrics.diffs_applied.clone()))?;
        registry.register(Box::new(metrics.sequence_gaps.clone()))?;
        registry.register(Box::new(metrics.resyncs.clone()))?;
        registry.register(Box::new(metrics.stale_snapshots.clone()))?;
        registry.register(Box::new(metrics.crossed_books.clone()))?;
        registry.register(Box::new(metrics.quotes.clone()))?;
        registry.register(Box::new(metrics.no_quote.clone()))?;
        registry.register(Box::new(metrics.fair_mid.clone()))?;
        registry.register(Box::new(metrics.half_spread.clone()))?;

        Ok(metrics)
    }

    /// Metric set bound to a private registry
    pub fn unregistered() -> Result<Self> {
        Self::register(&Registry::new())
    }
}

/// Render a registry in the prometheus text format
pub fn encode(registry: &Registry) -> Result<String> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| crate::error::MarketDataError::SerializationError(e.to_string()))
}
