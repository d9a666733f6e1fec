//! Venue feed connectors over WebSocket

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::WebSocketClient;
use crate::error::{MarketDataError, Result};
use crate::parser::{okx_inst_id, ParsedMessage, VenueKind};
use crate::sync::{FeedConnector, FeedStream};

/// Consecutive idle timeouts tolerated before the connection is declared dead
const MAX_IDLE_STRIKES: u32 = 2;

/// `wss://.../ws/btcusdt@depth@100ms`
pub fn binance_stream_url(endpoint: &str, symbol: &str, stream: &str) -> String {
    format!(
        "{}/{}@{}",
        endpoint.trim_end_matches('/'),
        symbol.to_lowercase(),
        stream
    )
}

/// OKX `books5` subscription for one instrument
pub fn okx_subscribe_message(symbol: &str) -> String {
    serde_json::json!({
        "op": "subscribe",
        "args": [{ "channel": "books5", "instId": okx_inst_id(symbol) }],
    })
    .to_string()
}

/// Opens WebSocket feeds for one venue stream
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    subscribe: Option<String>,
    kind: VenueKind,
    idle_timeout: Duration,
}

impl WsConnector {
    /// Binance sequenced diff stream
    pub fn binance_depth(endpoint: &str, symbol: &str, idle_timeout: Duration) -> Self {
        Self {
            url: binance_stream_url(endpoint, symbol, "depth@100ms"),
            subscribe: None,
            kind: VenueKind::Binance,
            idle_timeout,
        }
    }

    /// Binance top-5 partial book stream
    pub fn binance_partial(endpoint: &str, symbol: &str, idle_timeout: Duration) -> Self {
        Self {
            url: binance_stream_url(endpoint, symbol, "depth5@100ms"),
            subscribe: None,
            kind: VenueKind::Binance,
            idle_timeout,
        }
    }

    /// OKX `books5` public channel
    pub fn okx_books5(endpoint: &str, symbol: &str, idle_timeout: Duration) -> Self {
        Self {
            url: endpoint.to_string(),
            subscribe: Some(okx_subscribe_message(symbol)),
            kind: VenueKind::Okx,
            idle_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn FeedStream>> {
        let mut client = WebSocketClient::new(&self.url, self.subscribe.clone());
        client.connect().await?;
        Ok(Box::new(WsFeed {
            client,
            kind: self.kind,
            idle_timeout: self.idle_timeout,
            idle_strikes: 0,
        }))
    }
}

/// Parsed message stream over one WebSocket connection
pub struct WsFeed {
    client: WebSocketClient,
    kind: VenueKind,
    idle_timeout: Duration,
    idle_strikes: u32,
}

#[async_trait]
impl FeedStream for WsFeed {
    async fn next_message(&mut self) -> Result<Option<ParsedMessage>> {
        match timeout(self.idle_timeout, self.client.recv()).await {
            Ok(Ok(Some(text))) => {
                self.idle_strikes = 0;
                match ParsedMessage::parse(self.kind, &text) {
                    Ok(msg) => Ok(Some(msg)),
                    Err(e) => {
                        warn!(url = %self.client.url(), error = %e, "Skipping unparseable message");
                        Ok(None)
                    }
                }
            }
            Ok(Ok(None)) => {
                self.idle_strikes = 0;
                Ok(None)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.idle_strikes += 1;
                if self.idle_strikes >= MAX_IDLE_STRIKES {
                    warn!(url = %self.client.url(), "Feed idle, closing connection");
                    self.client.close().await;
                    return Err(MarketDataError::ConnectionTimeout);
                }
                debug!(
                    url = %self.client.url(),
                    idle_secs = self.idle_timeout.as_secs(),
                    "No message within timeout, sending keepalive"
                );
                if self.client.ping().await.is_err() {
                    self.client.close().await;
                    return Err(MarketDataError::ConnectionTimeout);
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::protocol::Message;

    #[tokio::test]
    async fn test_idle_feed_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            // Stay silent (no pongs) until the client gives up
            done_rx.await.unwrap();
            let mut frames = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                let closed = msg.is_close();
                frames.push(msg);
                if closed {
                    break;
                }
            }
            frames
        });

        let connector = WsConnector {
            url: format!("ws://{}", addr),
            subscribe: None,
            kind: VenueKind::Binance,
            idle_timeout: Duration::from_millis(50),
        };
        let mut feed = connector.connect().await.unwrap();

        // First idle window sends a keepalive, the second gives up
        assert!(matches!(feed.next_message().await, Ok(None)));
        assert!(matches!(
            feed.next_message().await,
            Err(MarketDataError::ConnectionTimeout)
        ));
        done_tx.send(()).unwrap();

        let frames = timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(frames.first(), Some(Message::Ping(_))));
        assert!(frames.last().map_or(false, Message::is_close));
    }

    #[test]
    fn test_binance_urls() {
        let idle = Duration::from_secs(45);
        let depth = WsConnector::binance_depth("wss://stream.binance.com:9443/ws", "BTCUSDT", idle);
        assert_eq!(
            depth.url(),
            "wss://stream.binance.com:9443/ws/btcusdt@depth@100ms"
        );

        let partial =
            WsConnector::binance_partial("wss://stream.binance.com:9443/ws/", "ETHUSDT", idle);
        assert_eq!(
            partial.url(),
            "wss://stream.binance.com:9443/ws/ethusdt@depth5@100ms"
        );
    }

    #[test]
    fn test_okx_subscription() {
        let msg: serde_json::Value = serde_json::from_str(&okx_subscribe_message("BTCUSDT")).unwrap();
        assert_eq!(msg["op"], "subscribe");
        assert_eq!(msg["args"][0]["channel"], "books5");
        assert_eq!(msg["args"][0]["instId"], "BTC-USDT");

        let connector = WsConnector::okx_books5(
            "wss://ws.okx.com:8443/ws/v5/public",
            "BTCUSDT",
            Duration::from_secs(30),
        );
        assert_eq!(connector.url(), "wss://ws.okx.com:8443/ws/v5/public");
        assert!(connector.subscribe.is_some());
    }
}
