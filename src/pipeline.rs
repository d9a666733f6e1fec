//! Hand-off between the synchronizers and the fusion engine
//!
//! Every synchronizer sends its views into one bounded queue. A single
//! [`QuoteConsumer`] drains it and is the only writer of the engine state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::fusion::{FairPriceEngine, FairQuote};
use crate::orderbook::VenueView;
use crate::publisher::QuoteSink;
use crate::telemetry::Metrics;

/// Queue item: the latest view of one venue's book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueUpdate {
    pub venue: String,
    pub symbol: String,
    pub view: VenueView,
}

/// Bounded queue preserving per-producer order
pub fn channel(capacity: usize) -> (mpsc::Sender<VenueUpdate>, mpsc::Receiver<VenueUpdate>) {
    mpsc::channel(capacity.max(1))
}

pub struct QuoteConsumer {
    engine: FairPriceEngine,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn QuoteSink>,
    metrics: Metrics,
}

impl QuoteConsumer {
    pub fn new(
        engine: FairPriceEngine,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn QuoteSink>,
        metrics: Metrics,
    ) -> Self {
        Self {
            engine,
            clock,
            sink,
            metrics,
        }
    }

    pub fn engine(&self) -> &FairPriceEngine {
        &self.engine
    }

    /// Fold one update into the engine and re-quote its symbol
    pub async fn handle(&mut self, update: VenueUpdate) -> Option<FairQuote> {
        let VenueUpdate {
            venue,
            symbol,
            view,
        } = update;
        self.engine.update(&venue, &symbol, view);

        let now_ns = self.clock.now_ns();
        let Some(quote) = self.engine.quote(&symbol, now_ns) else {
            self.metrics.no_quote.with_label_values(&[&symbol]).inc();
            debug!(symbol = %symbol, venue = %venue, "No quote");
            return None;
        };

        self.metrics.quotes.with_label_values(&[&symbol]).inc();
        self.metrics
            .fair_mid
            .with_label_values(&[&symbol])
            .set(quote.mid);
        self.metrics
            .half_spread
            .with_label_values(&[&symbol])
            .set(quote.half_spread());

        if let Err(e) = self.sink.publish(&quote).await {
            warn!(symbol = %symbol, error = %e, "Failed to publish quote");
        }

        Some(quote)
    }

    /// Drain the queue until every producer has gone away
    pub async fn run(mut self, mut updates: mpsc::Receiver<VenueUpdate>) {
        info!("Quote consumer started");
        while let Some(update) = updates.recv().await {
            self.handle(update).await;
        }
        info!("All producers closed, quote consumer stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FusionConfig;
    use crate::error::Result;
    use crate::fusion::InventoryLedger;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const NOW: u64 = 5_000_000_000;

    #[derive(Default)]
    struct RecordingSink {
        quotes: Mutex<Vec<FairQuote>>,
    }

    #[async_trait]
    impl QuoteSink for RecordingSink {
        async fn publish(&self, quote: &FairQuote) -> Result<()> {
            self.quotes.lock().push(quote.clone());
            Ok(())
        }
    }

    fn update(venue: &str, mid: f64, arrival_ns: u64) -> VenueUpdate {
        VenueUpdate {
            venue: venue.to_string(),
            symbol: "BTCUSDT".to_string(),
            view: VenueView {
                venue: venue.to_string(),
                symbol: "BTCUSDT".to_string(),
                bid: mid - 0.5,
                ask: mid + 0.5,
                mid,
                spread: 1.0,
                imbalance: 0.0,
                arrival_ns,
                last_update_id: 1,
                bids: vec![],
                asks: vec![],
            },
        }
    }

    fn consumer(sink: Arc<RecordingSink>, metrics: Metrics) -> QuoteConsumer {
        let engine = FairPriceEngine::new(FusionConfig::default(), Arc::new(InventoryLedger::new()));
        QuoteConsumer::new(engine, Arc::new(ManualClock::new(NOW)), sink, metrics)
    }

    #[tokio::test]
    async fn test_updates_become_quotes() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = Metrics::unregistered().unwrap();
        let consumer = consumer(sink.clone(), metrics.clone());

        let (tx, rx) = channel(8);
        tx.send(update("binance", 100.0, NOW - 1_000_000)).await.unwrap();
        tx.send(update("okx", 101.0, NOW)).await.unwrap();
        drop(tx);
        consumer.run(rx).await;

        let quotes = sink.quotes.lock();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].venues_used, vec!["binance".to_string()]);
        assert_eq!(quotes[1].venues_used.len(), 2);
        assert!(quotes[1].bid < quotes[1].ask);

        assert_eq!(metrics.quotes.with_label_values(&["BTCUSDT"]).get(), 2);
        assert_eq!(
            metrics.fair_mid.with_label_values(&["BTCUSDT"]).get(),
            quotes[1].mid
        );
    }

    #[tokio::test]
    async fn test_stale_update_counts_no_quote() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = Metrics::unregistered().unwrap();
        let mut consumer = consumer(sink.clone(), metrics.clone());

        assert!(consumer.handle(update("okx", 100.0, 0)).await.is_none());
        assert!(sink.quotes.lock().is_empty());
        assert_eq!(metrics.no_quote.with_label_values(&["BTCUSDT"]).get(), 1);
        assert_eq!(consumer.engine().latest_view("okx", "BTCUSDT").unwrap().mid, 100.0);
    }
}
