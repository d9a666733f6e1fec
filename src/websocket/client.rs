//! WebSocket client for venue streams
//!
//! Handles connection, optional subscription, and frame reception.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{MarketDataError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a single connection
pub struct WebSocketClient {
    stream: Option<WsStream>,
    url: String,
    /// Sent once right after the handshake
    subscribe: Option<String>,
}

impl WebSocketClient {
    pub fn new(url: &str, subscribe: Option<String>) -> Self {
        Self {
            stream: None,
            url: url.to_string(),
            subscribe,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect and send the subscription message, if any
    pub async fn connect(&mut self) -> Result<()> {
        info!(url = %self.url, "Connecting to WebSocket");

        let (mut ws_stream, response) = connect_async(self.url.as_str()).await.map_err(|e| {
            MarketDataError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;
        info!(status = ?response.status(), "WebSocket connected");

        if let Some(subscribe) = &self.subscribe {
            ws_stream
                .send(Message::Text(subscribe.clone()))
                .await
                .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))?;
            debug!(message = %subscribe, "Subscription sent");
        }

        self.stream = Some(ws_stream);
        Ok(())
    }

    /// Receive the next frame. `Ok(None)` for control frames.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MarketDataError::WebSocketConnection("Not connected".to_string()))?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(text)),
            Some(Ok(Message::Binary(data))) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                if let Err(e) = stream.send(Message::Pong(data)).await {
                    warn!(error = %e, "Failed to answer ping");
                }
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(MarketDataError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                Err(MarketDataError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(MarketDataError::WebSocketConnection(
                    "Stream ended".to_string(),
                ))
            }
        }
    }

    /// Keepalive ping
    pub async fn ping(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MarketDataError::WebSocketConnection("Not connected".to_string()))?;
        stream
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))
    }

    /// Send a close frame and drop the connection
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
