//! WebSocket transport for venue feeds

mod client;
mod feed;

pub use client::WebSocketClient;
pub use feed::{binance_stream_url, okx_subscribe_message, WsConnector, WsFeed};
