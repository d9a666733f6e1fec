//! Parser module for venue WebSocket and REST payloads
//!
//! Handles Binance diff depth events, Binance partial-depth and OKX `books5`
//! snapshots, and REST depth snapshots (including error-shaped responses).

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

use crate::error::MarketDataError;

/// Wire format family of a venue feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueKind {
    Binance,
    Okx,
}

/// Price level (price, quantity pair)
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Incremental depth update with its sequence range
#[derive(Debug, Clone)]
pub struct DepthUpdate {
    pub event_time: u64,
    pub symbol: String,
    /// First update ID in event
    pub first_update_id: u64,
    /// Final update ID in event
    pub final_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Binance depth event as received. Sequence fields are optional so that
/// events without them can be recognised and ignored.
#[derive(Debug, Deserialize)]
struct RawDepthEvent {
    #[serde(rename = "E", default)]
    event_time: u64,
    #[serde(rename = "s", default)]
    symbol: String,
    #[serde(rename = "U")]
    first_update_id: Option<u64>,
    #[serde(rename = "u")]
    final_update_id: Option<u64>,
    #[serde(rename = "b", default, deserialize_with = "deserialize_price_levels")]
    bids: Vec<PriceLevel>,
    #[serde(rename = "a", default, deserialize_with = "deserialize_price_levels")]
    asks: Vec<PriceLevel>,
}

/// Order book snapshot from REST API
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookSnapshot {
    /// Last update ID
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// REST depth response: either a book or a `{code, msg}` error payload
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SnapshotResponse {
    Book(OrderBookSnapshot),
    Error { code: i64, msg: String },
}

impl SnapshotResponse {
    pub fn into_result(self) -> crate::error::Result<OrderBookSnapshot> {
        match self {
            SnapshotResponse::Book(book) => Ok(book),
            SnapshotResponse::Error { code, msg } => Err(MarketDataError::VenueError { code, msg }),
        }
    }
}

/// Top-of-book levels pushed wholesale by snapshot-only feeds
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevels {
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Combined stream message wrapper
#[derive(Debug, Clone, Deserialize)]
struct StreamMessage {
    #[allow(dead_code)]
    stream: String,
    data: serde_json::Value,
}

/// OKX public channel push: `{"arg": {...}, "data": [{"bids": .., "asks": ..}]}`
#[derive(Debug, Deserialize)]
struct OkxPush {
    #[allow(dead_code)]
    arg: serde_json::Value,
    #[serde(default)]
    data: Vec<BookLevels>,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    DepthUpdate(DepthUpdate),
    BookSnapshot(BookLevels),
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message for the given venue format
    pub fn parse(kind: VenueKind, raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        match kind {
            VenueKind::Binance => Self::parse_binance(value),
            VenueKind::Okx => Self::parse_okx(value),
        }
    }

    fn parse_binance(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        // Combined streams wrap the payload in {"stream", "data"}
        let value = match serde_json::from_value::<StreamMessage>(value.clone()) {
            Ok(wrapper) => wrapper.data,
            Err(_) => value,
        };

        if let Some(event) = value.get("e").and_then(|e| e.as_str()) {
            if event != "depthUpdate" {
                return Ok(ParsedMessage::Unknown(event.to_string()));
            }
            let raw: RawDepthEvent = serde_json::from_value(value)?;
            return Ok(match (raw.first_update_id, raw.final_update_id) {
                (Some(first), Some(last)) => ParsedMessage::DepthUpdate(DepthUpdate {
                    event_time: raw.event_time,
                    symbol: raw.symbol,
                    first_update_id: first,
                    final_update_id: last,
                    bids: raw.bids,
                    asks: raw.asks,
                }),
                _ => ParsedMessage::Unknown("depthUpdate without sequence".to_string()),
            });
        }

        // Partial book depth stream (`@depth5`) carries a full top-K book
        if value.get("lastUpdateId").is_some() && value.get("bids").is_some() {
            let levels: BookLevels = serde_json::from_value(value)?;
            return Ok(ParsedMessage::BookSnapshot(levels));
        }

        Ok(ParsedMessage::Unknown(value.to_string()))
    }

    fn parse_okx(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.get("arg").is_some() && value.get("data").is_some() {
            let push: OkxPush = serde_json::from_value(value)?;
            if let Some(levels) = push.data.into_iter().next() {
                return Ok(ParsedMessage::BookSnapshot(levels));
            }
            return Ok(ParsedMessage::Unknown("empty data".to_string()));
        }

        // Subscription acks, errors and pongs
        Ok(ParsedMessage::Unknown(value.to_string()))
    }
}

/// OKX instrument id for a concatenated symbol: `BTCUSDT` -> `BTC-USDT`
pub fn okx_inst_id(symbol: &str) -> String {
    let symbol = symbol.to_uppercase();
    for quote in ["USDT", "USDC", "USD", "BTC", "ETH"] {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{}-{}", base, quote);
            }
        }
    }
    symbol
}

fn decimal_from_value(value: &serde_json::Value) -> Result<Decimal, String> {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(format!("Invalid price level entry: {}", other)),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| e.to_string())
}

/// Custom deserializer for price levels. Each entry is `[price, qty, ...]`,
/// with values given as strings or numbers; trailing fields are ignored.
fn deserialize_price_levels<'de, D>(deserializer: D) -> Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<serde_json::Value>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|entry| {
            if entry.len() < 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            Ok(PriceLevel {
                price: decimal_from_value(&entry[0]).map_err(serde::de::Error::custom)?,
                quantity: decimal_from_value(&entry[1]).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_depth_update() {
        let raw = r#"{
            "e": "depthUpdate",
            "E": 1672531200000,
            "s": "BTCUSDT",
            "U": 100,
            "u": 105,
            "b": [["50000.00", "1.5"], ["49999.00", "2.0"]],
            "a": [["50001.00", "1.0"], ["50002.00", "0"]]
        }"#;

        let msg = ParsedMessage::parse(VenueKind::Binance, raw).unwrap();
        if let ParsedMessage::DepthUpdate(depth) = msg {
            assert_eq!(depth.symbol, "BTCUSDT");
            assert_eq!(depth.first_update_id, 100);
            assert_eq!(depth.final_update_id, 105);
            assert_eq!(depth.bids.len(), 2);
            assert_eq!(depth.bids[0].price, dec!(50000.00));
            assert_eq!(depth.asks[1].quantity, Decimal::ZERO);
        } else {
            panic!("Expected DepthUpdate");
        }
    }

    #[test]
    fn test_parse_combined_stream_wrapper() {
        let raw = r#"{"stream":"btcusdt@depth@100ms","data":{
            "e":"depthUpdate","E":1,"s":"BTCUSDT","U":7,"u":9,"b":[],"a":[["1.5","2"]]}}"#;

        match ParsedMessage::parse(VenueKind::Binance, raw).unwrap() {
            ParsedMessage::DepthUpdate(depth) => {
                assert_eq!(depth.final_update_id, 9);
                assert_eq!(depth.asks[0].price, dec!(1.5));
            }
            other => panic!("Expected DepthUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_depth_event_without_sequence_is_ignored() {
        let raw = r#"{"e":"depthUpdate","E":1,"s":"BTCUSDT","b":[],"a":[]}"#;
        assert!(matches!(
            ParsedMessage::parse(VenueKind::Binance, raw).unwrap(),
            ParsedMessage::Unknown(_)
        ));

        let raw = r#"{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"1","q":"1","b":111,"a":222}"#;
        assert!(matches!(
            ParsedMessage::parse(VenueKind::Binance, raw).unwrap(),
            ParsedMessage::Unknown(_)
        ));
    }

    #[test]
    fn test_parse_partial_depth() {
        let raw = r#"{"lastUpdateId":160,"bids":[["0.0024","10"]],"asks":[["0.0026","100"]]}"#;
        match ParsedMessage::parse(VenueKind::Binance, raw).unwrap() {
            ParsedMessage::BookSnapshot(levels) => {
                assert_eq!(levels.bids[0].price, dec!(0.0024));
                assert_eq!(levels.asks[0].quantity, dec!(100));
            }
            other => panic!("Expected BookSnapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_okx_books5() {
        let raw = r#"{
            "arg": {"channel": "books5", "instId": "BTC-USDT"},
            "data": [{
                "asks": [["50001.1", "0.5", "0", "2"], ["50002", "1", "0", "1"]],
                "bids": [["50000.9", "0.7", "0", "3"]],
                "instId": "BTC-USDT",
                "ts": "1672531200000",
                "seqId": 123
            }]
        }"#;

        match ParsedMessage::parse(VenueKind::Okx, raw).unwrap() {
            ParsedMessage::BookSnapshot(levels) => {
                assert_eq!(levels.asks.len(), 2);
                assert_eq!(levels.bids[0].price, dec!(50000.9));
                assert_eq!(levels.bids[0].quantity, dec!(0.7));
            }
            other => panic!("Expected BookSnapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_okx_subscribe_ack_is_unknown() {
        let raw = r#"{"event":"subscribe","arg":{"channel":"books5","instId":"BTC-USDT"}}"#;
        assert!(matches!(
            ParsedMessage::parse(VenueKind::Okx, raw).unwrap(),
            ParsedMessage::Unknown(_)
        ));
    }

    #[test]
    fn test_snapshot_response_variants() {
        let ok = r#"{"lastUpdateId": 1027024, "bids": [["4.00000000", "431.00000000"]], "asks": [[4.00000200, 12]]}"#;
        let snapshot = serde_json::from_str::<SnapshotResponse>(ok)
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(snapshot.last_update_id, 1027024);
        assert_eq!(snapshot.asks[0].price, dec!(4.000002));
        assert_eq!(snapshot.asks[0].quantity, dec!(12));

        let err = r#"{"code": -1121, "msg": "Invalid symbol."}"#;
        let result = serde_json::from_str::<SnapshotResponse>(err)
            .unwrap()
            .into_result();
        assert!(matches!(
            result,
            Err(MarketDataError::VenueError { code: -1121, .. })
        ));
    }

    #[test]
    fn test_short_level_rejected() {
        let raw = r#"{"lastUpdateId": 1, "bids": [["4.0"]], "asks": []}"#;
        assert!(serde_json::from_str::<OrderBookSnapshot>(raw).is_err());
    }

    #[test]
    fn test_okx_inst_id() {
        assert_eq!(okx_inst_id("BTCUSDT"), "BTC-USDT");
        assert_eq!(okx_inst_id("ethusdc"), "ETH-USDC");
        assert_eq!(okx_inst_id("XYZ"), "XYZ");
    }
}
