use crate::error::{Result, XrpWatchError};
use clap::Parser;
use log::LevelFilter;
use std::net::{IpAddr, SocketAddr};
use tokio_tungstenite::tungstenite::http::Uri;

pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443";

/// Runtime settings, read from flags first and then from the environment
/// (a `.env` file is loaded before parsing).
#[derive(Debug, Clone, Parser)]
#[command(name = "xrpwatch", version, about = "Live XRP price alerts with trend analysis")]
pub struct Config {
    /// Address the HTTP API binds to
    #[arg(long, env = "XRPWATCH_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port the HTTP API listens on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Base URL of the Binance-compatible WebSocket feed
    #[arg(long, env = "XRPWATCH_FEED_URL", default_value = BINANCE_WS_URL)]
    pub feed_url: String,

    /// Symbol to subscribe to
    #[arg(long, env = "XRPWATCH_SYMBOL", default_value = "xrpusdt")]
    pub symbol: String,

    /// Number of samples kept in the price history
    #[arg(long, env = "XRPWATCH_HISTORY_CAPACITY", default_value_t = 100)]
    pub history_capacity: usize,

    /// Number of recent samples used by /analyze
    #[arg(long, env = "XRPWATCH_ANALYSIS_WINDOW", default_value_t = 100)]
    pub analysis_window: usize,

    /// Percent change needed to call a trend bullish or bearish
    #[arg(long, env = "XRPWATCH_TREND_THRESHOLD", default_value_t = 2.0)]
    pub trend_threshold: f64,

    /// Start with an empty alert list
    #[arg(long, env = "XRPWATCH_NO_DEFAULT_ALERTS")]
    pub no_default_alerts: bool,

    /// Log level for this crate (error, warn, info, debug, trace)
    #[arg(long, env = "XRPWATCH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: 8000,
            feed_url: BINANCE_WS_URL.to_string(),
            symbol: "xrpusdt".to_string(),
            history_capacity: 100,
            analysis_window: 100,
            trend_threshold: 2.0,
            no_default_alerts: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let uri: Uri = self
            .feed_url
            .parse()
            .map_err(|e| XrpWatchError::Config(format!("feed url '{}': {}", self.feed_url, e)))?;
        match uri.scheme_str() {
            Some("ws") | Some("wss") => {}
            _ => {
                return Err(XrpWatchError::Config(format!(
                    "feed url '{}' must use ws:// or wss://",
                    self.feed_url
                )))
            }
        }
        if uri.host().is_none() {
            return Err(XrpWatchError::Config(format!(
                "feed url '{}' has no host",
                self.feed_url
            )));
        }

        if self.symbol.trim().is_empty() {
            return Err(XrpWatchError::Config("symbol must not be empty".into()));
        }
        if self.history_capacity == 0 {
            return Err(XrpWatchError::Config("history capacity must be at least 1".into()));
        }
        if self.analysis_window == 0 {
            return Err(XrpWatchError::Config("analysis window must be at least 1".into()));
        }
        if !self.trend_threshold.is_finite() || self.trend_threshold <= 0.0 {
            return Err(XrpWatchError::Config(format!(
                "trend threshold must be positive, got {}",
                self.trend_threshold
            )));
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| XrpWatchError::Config(format!("unknown log level '{}'", self.log_level)))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn symbol(&self) -> String {
        self.symbol.trim().to_lowercase()
    }

    /// Combined-stream URL for the ticker of the configured symbol.
    pub fn stream_url(&self) -> String {
        format!(
            "{}/stream?streams={}@ticker",
            self.feed_url.trim_end_matches('/'),
            self.symbol()
        )
    }
}
