//! Fair Quote - Market Data and Fair Price Engine
//!
//! Connects to Binance and OKX book streams, keeps every venue book in sync,
//! and publishes latency-aware fair quotes to other system components.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use fair_quote::clock::{Clock, MonotonicClock};
use fair_quote::config::{Config, FusionConfig};
use fair_quote::fusion::{FairPriceEngine, InventoryLedger};
use fair_quote::pipeline::{self, QuoteConsumer};
use fair_quote::publisher::{Publisher, QuoteSink};
use fair_quote::snapshot::RestSnapshotClient;
use fair_quote::sync::{
    BookProtocol, BookSynchronizer, FeedConnector, SnapshotSource, SyncContext, SyncSettings,
    SyncStatus,
};
use fair_quote::telemetry::{self, Metrics};
use fair_quote::websocket::WsConnector;
use fair_quote::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    info!("Starting Fair Quote engine");

    let config = Arc::new(Config::load()?);
    let fusion = FusionConfig::load(config.fusion_config_path.as_deref().map(Path::new))?;
    info!(symbols = ?config.symbols, mode = ?fusion.mode, "Configuration loaded");

    let registry = prometheus::Registry::new();
    let metrics = Metrics::register(&registry)?;
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let status = Arc::new(SyncStatus::new());
    let inventory = Arc::new(InventoryLedger::new());

    let ctx = SyncContext {
        clock: clock.clone(),
        settings: SyncSettings::from_config(&config, &fusion),
        status: status.clone(),
        metrics: metrics.clone(),
    };
    let snapshots: Arc<dyn SnapshotSource> = Arc::new(RestSnapshotClient::new(
        &config.binance_rest_endpoint,
        config.snapshot_timeout(),
    )?);

    let (tx, rx) = pipeline::channel(config.queue_capacity);
    let idle = config.feed_idle_timeout();

    for symbol in &config.symbols {
        let feeds: Vec<(&str, BookProtocol, Arc<dyn FeedConnector>)> = vec![
            (
                "binance",
                BookProtocol::DiffSequenced {
                    snapshots: snapshots.clone(),
                },
                Arc::new(WsConnector::binance_depth(
                    &config.binance_ws_endpoint,
                    symbol,
                    idle,
                )) as Arc<dyn FeedConnector>,
            ),
            (
                "okx",
                BookProtocol::SnapshotOnly,
                Arc::new(WsConnector::okx_books5(&config.okx_ws_endpoint, symbol, idle))
                    as Arc<dyn FeedConnector>,
            ),
        ];

        for (venue, protocol, connector) in feeds {
            let sync =
                BookSynchronizer::new(venue, symbol, protocol, connector, tx.clone(), ctx.clone());
            tokio::spawn(sync.run());
        }
    }
    drop(tx);

    let sink: Arc<dyn QuoteSink> = Arc::new(Publisher::new(&config.ipc_socket_path).await);
    let engine = FairPriceEngine::new(fusion, inventory.clone());
    let consumer = QuoteConsumer::new(engine, clock, sink, metrics);

    let state = Arc::new(AppState {
        config: config.clone(),
        status,
        inventory,
        registry,
    });
    tokio::spawn(async move {
        if let Err(e) = start_health_server(state).await {
            warn!(error = %e, "Health server error");
        }
    });

    consumer.run(rx).await;
    Ok(())
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(addr = %addr, "Starting health check server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = if state.status.all_synced() {
        "healthy"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": status,
        "component": "fair-quote",
        "feeds": state.status.snapshot(),
        "inventory": state.inventory.snapshot(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    telemetry::encode(&state.registry).map_err(|e| {
        warn!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
