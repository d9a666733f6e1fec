//! Quote output
//!
//! Fair quotes leave the process through a [`QuoteSink`]. The production sink
//! writes length-prefixed MessagePack frames to a Unix socket.

use std::path::Path;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{MarketDataError, Result};
use crate::fusion::FairQuote;

/// Downstream consumer of fair quotes
#[async_trait]
pub trait QuoteSink: Send + Sync {
    async fn publish(&self, quote: &FairQuote) -> Result<()>;
}

/// Encode a quote as a 4-byte big-endian length followed by its MessagePack body
pub fn encode_frame(quote: &FairQuote) -> Result<Bytes> {
    let body = rmp_serde::to_vec_named(quote)?;
    let len = u32::try_from(body.len())
        .map_err(|_| MarketDataError::SerializationError("Frame too large".to_string()))?;

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(len);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Unix socket publisher with lazy reconnect
pub struct Publisher {
    socket_path: String,
    stream: Mutex<Option<UnixStream>>,
}

impl Publisher {
    /// Create a publisher; the socket may not exist yet
    pub async fn new(socket_path: &str) -> Self {
        let publisher = Self {
            socket_path: socket_path.to_string(),
            stream: Mutex::new(None),
        };

        if let Err(e) = publisher.connect().await {
            warn!(error = %e, "Initial IPC connection failed, will retry on publish");
        }

        publisher
    }

    async fn connect(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);
        if !path.exists() {
            return Err(MarketDataError::IpcError(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            MarketDataError::IpcError(format!("Failed to connect to {}: {}", self.socket_path, e))
        })?;
        *self.stream.lock().await = Some(stream);

        info!(path = %self.socket_path, "Connected to IPC socket");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }
}

#[async_trait]
impl QuoteSink for Publisher {
    /// Write one frame. Delivery failures are logged and swallowed.
    async fn publish(&self, quote: &FairQuote) -> Result<()> {
        let frame = encode_frame(quote)?;

        if !self.is_connected().await {
            if let Err(e) = self.connect().await {
                debug!(error = %e, "IPC socket unavailable, quote dropped");
                return Ok(());
            }
        }

        let mut guard = self.stream.lock().await;
        if let Some(stream) = guard.as_mut() {
            match stream.write_all(&frame).await {
                Ok(()) => debug!(symbol = %quote.symbol, t_ns = quote.t_ns, "Published quote"),
                Err(e) => {
                    warn!(error = %e, "Failed to write to IPC socket");
                    *guard = None;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    fn quote() -> FairQuote {
        FairQuote {
            t_ns: 42,
            symbol: "BTCUSDT".to_string(),
            mid: 50000.0,
            kalman_variance: 1e-4,
            bid: 49999.5,
            ask: 50000.5,
            inventory: 0.0,
            imbalance: 0.1,
            sigma: 0.0,
            venues_used: vec!["binance".to_string(), "okx".to_string()],
        }
    }

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(&quote()).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);

        let decoded: FairQuote = rmp_serde::from_slice(&frame[4..]).unwrap();
        assert_eq!(decoded, quote());
    }

    #[tokio::test]
    async fn test_missing_socket_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        let publisher = Publisher::new(path.to_str().unwrap()).await;

        assert!(!publisher.is_connected().await);
        assert!(publisher.publish(&quote()).await.is_ok());
    }

    #[tokio::test]
    async fn test_publishes_frames_to_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let publisher = Publisher::new(path.to_str().unwrap()).await;
        let (mut server, _) = listener.accept().await.unwrap();
        assert!(publisher.is_connected().await);

        publisher.publish(&quote()).await.unwrap();

        let mut len = [0u8; 4];
        server.read_exact(&mut len).await.unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        server.read_exact(&mut body).await.unwrap();

        let decoded: FairQuote = rmp_serde::from_slice(&body).unwrap();
        assert_eq!(decoded.venues_used.len(), 2);
        assert_eq!(decoded.mid, 50000.0);
    }
}
