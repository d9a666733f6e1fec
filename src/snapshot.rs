//! REST depth snapshots

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{MarketDataError, Result};
use crate::parser::{OrderBookSnapshot, SnapshotResponse};
use crate::sync::SnapshotSource;

/// Fetches `GET {endpoint}/depth?symbol=..&limit=..` snapshots
#[derive(Debug, Clone)]
pub struct RestSnapshotClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RestSnapshotClient {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MarketDataError::RestApiError(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn depth_url(&self, symbol: &str, limit: usize) -> String {
        format!(
            "{}/depth?symbol={}&limit={}",
            self.endpoint,
            symbol.to_uppercase(),
            limit
        )
    }
}

#[async_trait]
impl SnapshotSource for RestSnapshotClient {
    async fn fetch_snapshot(&self, symbol: &str, limit: usize) -> Result<OrderBookSnapshot> {
        let url = self.depth_url(symbol, limit);
        debug!(symbol = %symbol, url = %url, "Fetching order book snapshot");

        let body = self.client.get(&url).send().await?.text().await?;
        let snapshot = serde_json::from_str::<SnapshotResponse>(&body)?.into_result()?;

        info!(
            symbol = %symbol,
            last_update_id = snapshot.last_update_id,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Snapshot fetched"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Router};
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/v3", addr)
    }

    #[test]
    fn test_depth_url() {
        let client =
            RestSnapshotClient::new("https://api.binance.com/api/v3/", Duration::from_secs(10))
                .unwrap();
        assert_eq!(
            client.depth_url("btcusdt", 1000),
            "https://api.binance.com/api/v3/depth?symbol=BTCUSDT&limit=1000"
        );
    }

    #[tokio::test]
    async fn test_fetch_snapshot() {
        let app = Router::new().route(
            "/api/v3/depth",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params["symbol"], "BTCUSDT");
                assert_eq!(params["limit"], "5");
                r#"{"lastUpdateId":1027024,"bids":[["4.00000000","431.00000000"]],"asks":[["4.00000200","12.00000000"]]}"#
            }),
        );
        let endpoint = serve(app).await;

        let client = RestSnapshotClient::new(&endpoint, Duration::from_secs(5)).unwrap();
        let snapshot = client.fetch_snapshot("BTCUSDT", 5).await.unwrap();
        assert_eq!(snapshot.last_update_id, 1027024);
        assert_eq!(snapshot.bids.len(), 1);
        assert_eq!(snapshot.asks.len(), 1);
    }

    #[tokio::test]
    async fn test_error_payload_is_venue_error() {
        let app = Router::new().route(
            "/api/v3/depth",
            get(|| async { r#"{"code":-1121,"msg":"Invalid symbol."}"# }),
        );
        let endpoint = serve(app).await;

        let client = RestSnapshotClient::new(&endpoint, Duration::from_secs(5)).unwrap();
        match client.fetch_snapshot("NOPE", 5).await {
            Err(MarketDataError::VenueError { code, msg }) => {
                assert_eq!(code, -1121);
                assert_eq!(msg, "Invalid symbol.");
            }
            other => panic!("expected venue error, got {:?}", other),
        }
    }
}
