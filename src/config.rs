//! Configuration for the feeds and the fair price engine

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{MarketDataError, Result};

/// Process configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Trading symbols to quote (e.g., ["BTCUSDT", "ETHUSDT"])
    pub symbols: Vec<String>,

    /// WebSocket endpoint for Binance diff streams
    pub binance_ws_endpoint: String,

    /// REST API endpoint for Binance snapshots
    pub binance_rest_endpoint: String,

    /// WebSocket endpoint for OKX public channels
    pub okx_ws_endpoint: String,

    /// IPC socket path for publishing quotes
    pub ipc_socket_path: String,

    /// Depth requested from the snapshot endpoint
    pub snapshot_depth: usize,

    /// Price levels kept per book side
    pub book_depth: usize,

    pub reconnect_delay_ms: u64,
    pub snapshot_retry_delay_ms: u64,
    pub snapshot_timeout_ms: u64,
    pub max_snapshot_attempts: u32,

    /// Pending diffs tolerated while waiting for the gate event
    pub max_pending_diffs: usize,

    /// Seconds without a frame before a keepalive ping is sent
    pub feed_idle_timeout_secs: u64,

    /// Capacity of the hand-off queue into the fusion engine
    pub queue_capacity: usize,

    pub health_port: u16,

    /// Optional fusion parameter file
    pub fusion_config_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let symbols: Vec<String> = env::var("SYMBOLS")
            .unwrap_or_else(|_| "BTCUSDT".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let defaults = Self::default();

        Ok(Self {
            symbols,
            binance_ws_endpoint: env::var("BINANCE_WS_ENDPOINT")
                .unwrap_or(defaults.binance_ws_endpoint),
            binance_rest_endpoint: env::var("BINANCE_REST_ENDPOINT")
                .unwrap_or(defaults.binance_rest_endpoint),
            okx_ws_endpoint: env::var("OKX_WS_ENDPOINT").unwrap_or(defaults.okx_ws_endpoint),
            ipc_socket_path: env::var("IPC_SOCKET_PATH").unwrap_or(defaults.ipc_socket_path),
            snapshot_depth: env_or("SNAPSHOT_DEPTH", defaults.snapshot_depth),
            book_depth: env_or("BOOK_DEPTH", defaults.book_depth),
            reconnect_delay_ms: env_or("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            snapshot_retry_delay_ms: env_or(
                "SNAPSHOT_RETRY_DELAY_MS",
                defaults.snapshot_retry_delay_ms,
            ),
            snapshot_timeout_ms: env_or("SNAPSHOT_TIMEOUT_MS", defaults.snapshot_timeout_ms),
            max_snapshot_attempts: env_or(
                "MAX_SNAPSHOT_ATTEMPTS",
                defaults.max_snapshot_attempts,
            ),
            max_pending_diffs: env_or("MAX_PENDING_DIFFS", defaults.max_pending_diffs),
            feed_idle_timeout_secs: env_or(
                "FEED_IDLE_TIMEOUT_SECS",
                defaults.feed_idle_timeout_secs,
            ),
            queue_capacity: env_or("QUEUE_CAPACITY", defaults.queue_capacity),
            health_port: env_or("HEALTH_PORT", defaults.health_port),
            fusion_config_path: env::var("FUSION_CONFIG").ok(),
        })
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn snapshot_retry_delay(&self) -> Duration {
        Duration::from_millis(self.snapshot_retry_delay_ms)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }

    pub fn feed_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_idle_timeout_secs)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            binance_ws_endpoint: "wss://stream.binance.com:9443/ws".to_string(),
            binance_rest_endpoint: "https://api.binance.com/api/v3".to_string(),
            okx_ws_endpoint: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
            ipc_socket_path: "/tmp/fairquote.sock".to_string(),
            snapshot_depth: 1000,
            book_depth: 1000,
            reconnect_delay_ms: 500,
            snapshot_retry_delay_ms: 50,
            snapshot_timeout_ms: 10_000,
            max_snapshot_attempts: 200,
            max_pending_diffs: 5000,
            feed_idle_timeout_secs: 45,
            queue_capacity: 4096,
            health_port: 9090,
            fusion_config_path: None,
        }
    }
}

/// How venue mids are combined into one fair value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Recursive variance-weighted estimator
    Kalman,
    /// Plain `1 / (age + eps)` weighted average of mids
    InverseAge,
}

/// Tuning parameters of the fair price engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub mode: FusionMode,
    /// Process noise added to the estimate variance on every step
    pub q_process: f64,
    /// Measurement noise floor
    pub r0: f64,
    /// Measurement noise per second of venue age
    pub r1: f64,
    /// Measurement noise per squared unit of venue spread
    pub r2: f64,
    pub vol_halflife_s: f64,
    /// Horizon (seconds) over which volatility widens the quote
    pub h_secs: f64,
    pub a_unc: f64,
    pub b_impact: f64,
    /// Mid skew per unit of inventory
    pub kappa: f64,
    pub min_half: f64,
    pub max_half: f64,
    pub ann_factor: f64,
    pub stale_threshold_ms: u64,
    pub top_k: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        let tick = 0.01;
        let r0 = (tick / 2.0_f64).powi(2);
        Self {
            mode: FusionMode::Kalman,
            q_process: 1e-5,
            r0,
            r1: r0 * 0.4,
            r2: 0.15,
            vol_halflife_s: 60.0,
            h_secs: 1.0,
            a_unc: 0.3,
            b_impact: 0.1,
            kappa: 0.01 * tick,
            min_half: tick,
            max_half: 5.0,
            ann_factor: 1.0,
            stale_threshold_ms: 500,
            top_k: 5,
        }
    }
}

/// Summary statistics of a recorded trading day, used to seed a config
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    /// Median quoted spread (ask - bid)
    pub median_spread: f64,
    /// Variance of 1-second mid changes
    pub var_1s: f64,
}

impl FusionConfig {
    /// Load defaults, then an optional file, then `FUSION_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let cfg: Self = builder
            .add_source(config::Environment::with_prefix("FUSION").try_parsing(true))
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Derive a starting configuration from observed market statistics
    pub fn calibrated(stats: &MarketStats, tick: f64) -> Self {
        let r0 = (tick / 2.0).powi(2);
        Self {
            mode: FusionMode::Kalman,
            q_process: stats.var_1s * 0.10,
            r0,
            r1: r0 * 0.4,
            r2: 0.15,
            vol_halflife_s: 60.0,
            h_secs: 1.0,
            a_unc: 0.3,
            b_impact: 0.1,
            kappa: 0.01 * tick,
            min_half: tick,
            max_half: (3.0 * stats.median_spread).max(tick),
            ann_factor: 1.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(MarketDataError::ConfigError(msg.to_string()));

        if !(self.min_half >= 0.0 && self.min_half <= self.max_half) {
            return invalid("min_half must be non-negative and <= max_half");
        }
        if [self.q_process, self.r0, self.r1, self.r2]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return invalid("noise parameters must be finite and non-negative");
        }
        if !(self.vol_halflife_s > 0.0) {
            return invalid("vol_halflife_s must be positive");
        }
        if self.h_secs < 0.0 || self.ann_factor < 0.0 {
            return invalid("h_secs and ann_factor must be non-negative");
        }
        if self.top_k == 0 {
            return invalid("top_k must be at least 1");
        }
        Ok(())
    }

    pub fn stale_threshold_ns(&self) -> u64 {
        self.stale_threshold_ms * 1_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_fusion_config_is_valid() {
        let cfg = FusionConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.stale_threshold_ns(), 500_000_000);
        assert_eq!(cfg.top_k, 5);
    }

    #[test]
    fn test_inverted_half_bounds_rejected() {
        let cfg = FusionConfig {
            min_half: 2.0,
            max_half: 1.0,
            ..FusionConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(MarketDataError::ConfigError(_))
        ));
    }

    #[test]
    fn test_calibrated_from_stats() {
        let stats = MarketStats {
            median_spread: 0.02,
            var_1s: 4.0,
        };
        let cfg = FusionConfig::calibrated(&stats, 0.01);
        assert!((cfg.q_process - 0.4).abs() < 1e-12);
        assert!((cfg.r0 - 0.000025).abs() < 1e-12);
        assert!((cfg.r1 - 0.00001).abs() < 1e-12);
        assert!((cfg.max_half - 0.06).abs() < 1e-12);
        assert_eq!(cfg.min_half, 0.01);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "a_unc = 0.5\nkappa = 0.0\nmode = \"inverse_age\"").unwrap();

        let cfg = FusionConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.a_unc, 0.5);
        assert_eq!(cfg.kappa, 0.0);
        assert_eq!(cfg.mode, FusionMode::InverseAge);
        assert_eq!(cfg.top_k, 5);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "min_half = 10.0\nmax_half = 1.0").unwrap();

        assert!(FusionConfig::load(Some(file.path())).is_err());
    }
}
