use crate::config::Config;
use crate::error::Result;
use crate::engine::alerts::AlertRegistry;
use crate::engine::analyzer::TrendAnalyzer;
use crate::engine::history::PriceHistory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub state: FeedState,
    pub reconnect_attempts: u32,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self {
            state: FeedState::Disconnected,
            reconnect_attempts: 0,
            messages_received: 0,
            messages_dropped: 0,
            last_message_at: None,
        }
    }
}

/// Everything the feed task and the HTTP server share. Built once in `main`
/// and handed to both by cloning.
#[derive(Clone)]
pub struct AppState {
    pub symbol: String,
    pub analysis_window: usize,
    pub analyzer: TrendAnalyzer,
    pub alerts: Arc<Mutex<AlertRegistry>>,
    pub history: Arc<Mutex<PriceHistory>>,
    pub feed: Arc<Mutex<FeedStatus>>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let symbol = config.symbol();
        let registry = if config.no_default_alerts {
            AlertRegistry::new()
        } else {
            AlertRegistry::with_defaults(&symbol)?
        };

        Ok(Self {
            analysis_window: config.analysis_window,
            analyzer: TrendAnalyzer::new(config.trend_threshold),
            alerts: Arc::new(Mutex::new(registry)),
            history: Arc::new(Mutex::new(PriceHistory::new(config.history_capacity))),
            feed: Arc::new(Mutex::new(FeedStatus::default())),
            symbol,
        })
    }

    pub fn alerts(&self) -> MutexGuard<'_, AlertRegistry> {
        lock(&self.alerts)
    }

    pub fn history(&self) -> MutexGuard<'_, PriceHistory> {
        lock(&self.history)
    }

    pub fn feed(&self) -> MutexGuard<'_, FeedStatus> {
        lock(&self.feed)
    }

    pub fn set_feed_state(&self, state: FeedState) {
        self.feed().state = state;
    }
}

// A panic while holding one of these locks cannot leave a half-applied
// update behind, so a poisoned lock is still safe to use.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
