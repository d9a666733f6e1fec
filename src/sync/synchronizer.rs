//! Per-venue book synchronizer
//!
//! Drives one [`VenueBook`] through connect, buffering, snapshot acquisition,
//! gate search and steady-state application. Any failure tears the session
//! down, waits the reconnect delay and starts over from a fresh connection.

use std::convert::Infallible;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::{
    BookProtocol, FeedConnector, FeedStream, PendingDiffs, SnapshotSource, SyncSettings, SyncState,
    SyncStatus,
};
use crate::clock::Clock;
use crate::error::{MarketDataError, Result};
use crate::orderbook::{DiffEvent, DiffOutcome, VenueBook};
use crate::parser::{OrderBookSnapshot, ParsedMessage};
use crate::pipeline::VenueUpdate;
use crate::telemetry::Metrics;

/// Collaborators shared by every synchronizer in the process
#[derive(Clone)]
pub struct SyncContext {
    pub clock: Arc<dyn Clock>,
    pub settings: SyncSettings,
    pub status: Arc<SyncStatus>,
    pub metrics: Metrics,
}

type Stamped = Result<(u64, ParsedMessage)>;

/// Reads the feed on its own task so diffs keep arriving while a snapshot is
/// being fetched. Dropping the pump aborts the read task.
///
/// The hand-off is bounded: once `capacity` frames are waiting the reader
/// stops pulling from the socket until the synchronizer catches up.
struct FeedPump {
    rx: mpsc::Receiver<Stamped>,
    task: JoinHandle<()>,
}

impl FeedPump {
    fn spawn(mut stream: Box<dyn FeedStream>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(async move {
            loop {
                match stream.next_message().await {
                    Ok(Some(msg)) => {
                        if tx.send(Ok((clock.now_ns(), msg))).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });
        Self { rx, task }
    }

    async fn recv(&mut self) -> Stamped {
        match self.rx.recv().await {
            Some(item) => item,
            None => Err(MarketDataError::WebSocketConnection(
                "Feed reader stopped".to_string(),
            )),
        }
    }

    /// Move already-arrived diffs into `pending` without waiting
    fn drain_ready(&mut self, pending: &mut PendingDiffs) -> Result<()> {
        while let Ok(item) = self.rx.try_recv() {
            let (arrival_ns, msg) = item?;
            if let ParsedMessage::DepthUpdate(update) = msg {
                pending.push(DiffEvent::from_update(update, arrival_ns));
            }
        }
        Ok(())
    }
}

impl Drop for FeedPump {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct BookSynchronizer {
    venue: String,
    symbol: String,
    protocol: BookProtocol,
    connector: Arc<dyn FeedConnector>,
    updates: mpsc::Sender<VenueUpdate>,
    ctx: SyncContext,
    book: VenueBook,
}

impl BookSynchronizer {
    pub fn new(
        venue: &str,
        symbol: &str,
        protocol: BookProtocol,
        connector: Arc<dyn FeedConnector>,
        updates: mpsc::Sender<VenueUpdate>,
        ctx: SyncContext,
    ) -> Self {
        let book = VenueBook::new(venue, symbol, ctx.settings.book_depth, ctx.settings.top_k);
        Self {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            protocol,
            connector,
            updates,
            ctx,
            book,
        }
    }

    /// Run until the hand-off queue is closed
    pub async fn run(mut self) {
        info!(
            venue = %self.venue,
            symbol = %self.symbol,
            protocol = self.protocol.name(),
            "Starting book synchronizer"
        );

        loop {
            self.set_state(SyncState::Connecting);

            let err = match self.session().await {
                Ok(never) => match never {},
                Err(e) => e,
            };

            if matches!(err, MarketDataError::ChannelClosed) {
                info!(venue = %self.venue, symbol = %self.symbol, "Hand-off queue closed, stopping");
                return;
            }

            if err.is_desync() {
                warn!(venue = %self.venue, symbol = %self.symbol, error = %err, "Book desynchronized, resyncing");
            } else {
                warn!(venue = %self.venue, symbol = %self.symbol, error = %err, "Feed session failed, reconnecting");
            }
            self.ctx
                .metrics
                .resyncs
                .with_label_values(&[&self.venue, &self.symbol])
                .inc();
            self.ctx.status.record_resync(&self.venue, &self.symbol);

            self.book.reset();
            self.ctx.clock.sleep(self.ctx.settings.reconnect_delay).await;
        }
    }

    async fn session(&mut self) -> Result<Infallible> {
        let stream = self.connector.connect().await?;
        let mut feed = FeedPump::spawn(
            stream,
            self.ctx.clock.clone(),
            self.ctx.settings.max_pending_diffs,
        );
        info!(venue = %self.venue, symbol = %self.symbol, "Feed connected");

        match self.protocol.clone() {
            BookProtocol::DiffSequenced { snapshots } => {
                self.sync_diffs(&mut feed, snapshots.as_ref()).await
            }
            BookProtocol::SnapshotOnly => self.stream_snapshots(&mut feed).await,
        }
    }

    async fn sync_diffs(
        &mut self,
        feed: &mut FeedPump,
        snapshots: &dyn SnapshotSource,
    ) -> Result<Infallible> {
        self.set_state(SyncState::Buffering);
        let mut pending = PendingDiffs::new();
        while pending.is_empty() {
            let (arrival_ns, msg) = feed.recv().await?;
            if let ParsedMessage::DepthUpdate(update) = msg {
                pending.push(DiffEvent::from_update(update, arrival_ns));
            }
        }

        self.set_state(SyncState::AwaitingSnapshot);
        let snapshot = self.fetch_fresh_snapshot(snapshots, feed, &mut pending).await?;
        self.book
            .load_snapshot(snapshot.last_update_id, &snapshot.bids, &snapshot.asks);
        let last_update_id = self.book.last_update_id();
        let dropped = pending.prune_covered(last_update_id);
        info!(
            venue = %self.venue,
            symbol = %self.symbol,
            last_update_id,
            dropped,
            "Snapshot loaded"
        );

        self.set_state(SyncState::GateWait);
        loop {
            feed.drain_ready(&mut pending)?;
            pending.prune_covered(last_update_id);
            if pending.head_bridges(last_update_id) {
                break;
            }
            if pending.overflowed(self.ctx.settings.max_pending_diffs) {
                return Err(MarketDataError::GateOverflow {
                    pending: pending.len(),
                });
            }
            let (arrival_ns, msg) = feed.recv().await?;
            if let ParsedMessage::DepthUpdate(update) = msg {
                pending.push(DiffEvent::from_update(update, arrival_ns));
            }
        }

        self.set_state(SyncState::Synced);
        let replay: Vec<DiffEvent> = pending.drain().collect();
        for event in &replay {
            self.apply(event).await?;
        }

        loop {
            let (arrival_ns, msg) = feed.recv().await?;
            match msg {
                ParsedMessage::DepthUpdate(update) => {
                    self.apply(&DiffEvent::from_update(update, arrival_ns)).await?;
                }
                other => trace!(venue = %self.venue, message = ?other, "Ignoring non-diff message"),
            }
        }
    }

    /// Fetch snapshots until one is at least as recent as the buffered head
    async fn fetch_fresh_snapshot(
        &self,
        snapshots: &dyn SnapshotSource,
        feed: &mut FeedPump,
        pending: &mut PendingDiffs,
    ) -> Result<OrderBookSnapshot> {
        let settings = &self.ctx.settings;

        for attempt in 1..=settings.max_snapshot_attempts {
            let fetched = timeout(
                settings.snapshot_timeout,
                snapshots.fetch_snapshot(&self.symbol, settings.snapshot_depth),
            )
            .await
            .unwrap_or(Err(MarketDataError::SnapshotTimeout));

            feed.drain_ready(pending)?;

            match fetched {
                Ok(snapshot) => {
                    let head_first = pending.front().map_or(0, |e| e.first_update_id);
                    if snapshot.last_update_id >= head_first {
                        return Ok(snapshot);
                    }
                    debug!(
                        venue = %self.venue,
                        symbol = %self.symbol,
                        attempt,
                        snapshot_id = snapshot.last_update_id,
                        first_buffered = head_first,
                        "Snapshot older than buffered stream, refetching"
                    );
                    self.ctx
                        .metrics
                        .stale_snapshots
                        .with_label_values(&[&self.venue, &self.symbol])
                        .inc();
                }
                Err(e) => {
                    warn!(venue = %self.venue, symbol = %self.symbol, attempt, error = %e, "Snapshot fetch failed");
                }
            }

            self.ctx.clock.sleep(settings.snapshot_retry_delay).await;
        }

        Err(MarketDataError::SnapshotRetriesExhausted {
            attempts: settings.max_snapshot_attempts,
        })
    }

    async fn stream_snapshots(&mut self, feed: &mut FeedPump) -> Result<Infallible> {
        self.set_state(SyncState::Synced);
        loop {
            let (arrival_ns, msg) = feed.recv().await?;
            match msg {
                ParsedMessage::BookSnapshot(levels) => {
                    self.book
                        .apply_snapshot(&levels.bids, &levels.asks, arrival_ns);
                    self.publish_view().await?;
                }
                other => trace!(venue = %self.venue, message = ?other, "Ignoring message"),
            }
        }
    }

    async fn apply(&mut self, event: &DiffEvent) -> Result<()> {
        match self.book.apply_diff(event) {
            Ok(DiffOutcome::Applied) => {
                self.ctx
                    .metrics
                    .diffs_applied
                    .with_label_values(&[&self.venue, &self.symbol])
                    .inc();
                trace!(
                    venue = %self.venue,
                    symbol = %self.symbol,
                    last_update_id = event.final_update_id,
                    "Diff applied"
                );
                self.publish_view().await
            }
            Ok(DiffOutcome::Stale) => Ok(()),
            Err(e) => {
                if let MarketDataError::SequenceGap { .. } = e {
                    self.ctx
                        .metrics
                        .sequence_gaps
                        .with_label_values(&[&self.venue, &self.symbol])
                        .inc();
                }
                Err(e)
            }
        }
    }

    async fn publish_view(&self) -> Result<()> {
        if self.book.is_crossed() {
            self.ctx
                .metrics
                .crossed_books
                .with_label_values(&[&self.venue, &self.symbol])
                .inc();
            debug!(venue = %self.venue, symbol = %self.symbol, "Crossed book, no view");
            return Ok(());
        }

        let Some(view) = self.book.view() else {
            return Ok(());
        };

        self.updates
            .send(VenueUpdate {
                venue: self.venue.clone(),
                symbol: self.symbol.clone(),
                view,
            })
            .await
            .map_err(|_| MarketDataError::ChannelClosed)
    }

    fn set_state(&self, state: SyncState) {
        info!(venue = %self.venue, symbol = %self.symbol, state = ?state, "Sync state");
        self.ctx.status.set_state(&self.venue, &self.symbol, state);
    }
}
