use crate::engine::history::PriceSample;
use crate::engine::notify::AlertNotification;
use crate::error::{Result, XrpWatchError};
use crate::state::{AppState, FeedState};
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Combined-stream envelope, or a bare ticker when connected to a raw stream.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedMessage {
    Combined {
        #[allow(dead_code)]
        stream: String,
        data: TickerData,
    },
    Raw(TickerData),
}

#[derive(Debug, Deserialize)]
struct TickerData {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "E", default)]
    event_time: Option<i64>,
}

impl FeedMessage {
    fn into_ticker(self) -> TickerData {
        match self {
            FeedMessage::Combined { data, .. } => data,
            FeedMessage::Raw(data) => data,
        }
    }
}

/// Reconnect delay schedule: `initial_delay * backoff_factor^attempt`,
/// capped at `max_delay`, with up to ±25% jitter.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_factor.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let final_ms = if self.jitter {
            let jitter_range = capped * 0.25;
            let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }
}

enum SessionEnd {
    Closed,
    Shutdown,
}

/// Consumes the ticker stream for one symbol, records every price and
/// evaluates the alert registry against it.
pub struct FeedListener {
    url: String,
    state: AppState,
    notifications: mpsc::Sender<AlertNotification>,
    backoff: BackoffConfig,
}

impl FeedListener {
    pub fn new(url: String, state: AppState, notifications: mpsc::Sender<AlertNotification>) -> Self {
        Self {
            url,
            state,
            notifications,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs until `shutdown` flips to true (or its sender is dropped),
    /// reconnecting with backoff whenever the stream ends or fails.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut attempts: u32 = 0;

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }
            if attempts == 0 {
                self.state.set_feed_state(FeedState::Connecting);
            }
            info!("Connecting to price feed: {}", self.url);

            let connected = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                _ = shutdown.changed() => break,
            };

            match connected {
                Ok((ws_stream, _)) => {
                    info!("Successfully connected to price feed");
                    attempts = 0;
                    {
                        let mut feed = self.state.feed();
                        feed.state = FeedState::Connected;
                        feed.reconnect_attempts = 0;
                    }

                    match self.consume(ws_stream, &mut shutdown).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Closed) => info!("Price feed connection closed"),
                        Err(e) => error!("Price feed error: {}", e),
                    }
                }
                Err(e) => error!("Connection error: {}", e),
            }

            let delay = self.backoff.delay_for_attempt(attempts);
            attempts = attempts.saturating_add(1);
            {
                let mut feed = self.state.feed();
                feed.state = FeedState::Reconnecting;
                feed.reconnect_attempts = attempts;
            }
            warn!("Reconnecting to price feed in {:?} (attempt {})", delay, attempts);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.state.set_feed_state(FeedState::Disconnected);
        info!("Price feed listener stopped");
    }

    async fn consume(
        &self,
        mut ws_stream: WsStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd> {
        loop {
            tokio::select! {
                message = ws_stream.next() => match message {
                    Some(Ok(tungstenite::Message::Text(text))) => self.dispatch(&text).await,
                    Some(Ok(tungstenite::Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                    Some(Ok(_)) => {} // Ignore other message types
                    Some(Err(e)) => return Err(e.into()),
                },
                _ = shutdown.changed() => {
                    if let Err(e) = ws_stream.close(None).await {
                        debug!("Close handshake failed: {}", e);
                    }
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    async fn dispatch(&self, text: &str) {
        let notifications = match self.handle_message(text) {
            Ok(notifications) => notifications,
            Err(e) => {
                warn!("Dropping feed message: {}", e);
                return;
            }
        };

        for notification in notifications {
            if let Err(e) = self.notifications.send(notification).await {
                error!("Failed to send alert notification: {}", e);
            }
        }
    }

    /// Parses one feed message, records the sample and returns a
    /// notification for each alert it triggers. Malformed messages are
    /// counted as dropped and returned as `Feed` errors.
    pub fn handle_message(&self, text: &str) -> Result<Vec<AlertNotification>> {
        let sample = match self.parse_sample(text) {
            Ok(sample) => sample,
            Err(e) => {
                self.state.feed().messages_dropped += 1;
                return Err(e);
            }
        };
        debug!("{}: price = {}", sample.symbol, sample.price);

        self.state.history().record(sample.clone());
        let triggered = self.state.alerts().evaluate(&sample.symbol, sample.price);

        {
            let mut feed = self.state.feed();
            feed.messages_received += 1;
            feed.last_message_at = Some(sample.timestamp);
        }

        Ok(triggered
            .iter()
            .map(|alert| AlertNotification::new(alert, sample.price, sample.timestamp))
            .collect())
    }

    fn parse_sample(&self, text: &str) -> Result<PriceSample> {
        let ticker = serde_json::from_str::<FeedMessage>(text)
            .map_err(|e| XrpWatchError::Feed(format!("unparseable message: {}", e)))?
            .into_ticker();

        if !ticker.symbol.eq_ignore_ascii_case(&self.state.symbol) {
            return Err(XrpWatchError::Feed(format!(
                "unexpected symbol {}",
                ticker.symbol
            )));
        }

        let price = ticker.last_price.parse::<f64>().map_err(|e| {
            XrpWatchError::Feed(format!("invalid price '{}': {}", ticker.last_price, e))
        })?;
        if !price.is_finite() || price <= 0.0 {
            return Err(XrpWatchError::Feed(format!("invalid price '{}'", ticker.last_price)));
        }

        let timestamp = ticker
            .event_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Ok(PriceSample::new(&ticker.symbol, price, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::alerts::AlertCondition;
    use futures_util::SinkExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    fn ticker_json(symbol: &str, price: &str) -> String {
        format!(
            r#"{{"stream":"{}@ticker","data":{{"e":"24hrTicker","E":1700000000000,"s":"{}","c":"{}","p":"0.01","P":"0.40","v":"1000"}}}}"#,
            symbol.to_lowercase(),
            symbol,
            price
        )
    }

    fn new_listener(url: &str) -> (FeedListener, AppState, mpsc::Receiver<AlertNotification>) {
        let state = AppState::new(&Config::default()).unwrap();
        let (tx, rx) = mpsc::channel(16);
        let listener = FeedListener::new(url.to_string(), state.clone(), tx).with_backoff(BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_factor: 2.0,
            jitter: false,
        });
        (listener, state, rx)
    }

    #[test]
    fn test_backoff_schedule_without_jitter() {
        let backoff = BackoffConfig {
            jitter: false,
            ..BackoffConfig::default()
        };
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_secs(30));
        assert_eq!(backoff.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let backoff = BackoffConfig::default();
        for _ in 0..50 {
            let delay = backoff.delay_for_attempt(2);
            assert!(delay >= Duration::from_millis(3000) && delay <= Duration::from_millis(5000));
        }
    }

    #[test]
    fn test_handle_message_records_and_triggers() {
        let (listener, state, _rx) = new_listener("ws://unused");

        let quiet = listener.handle_message(&ticker_json("XRPUSDT", "2.40")).unwrap();
        assert!(quiet.is_empty());

        let fired = listener.handle_message(&ticker_json("XRPUSDT", "2.60")).unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].condition, AlertCondition::GreaterThan);
        assert_eq!(fired[0].price, 2.60);

        let history = state.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().map(|s| s.price), Some(2.60));
        assert_eq!(
            history.latest().map(|s| s.timestamp.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert_eq!(state.feed().messages_received, 2);
    }

    #[test]
    fn test_handle_raw_ticker() {
        let (listener, state, _rx) = new_listener("ws://unused");
        let fired = listener
            .handle_message(r#"{"s":"XRPUSDT","c":"1.5"}"#)
            .unwrap();

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].condition, AlertCondition::LessThan);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_malformed_messages_are_dropped() {
        let (listener, state, _rx) = new_listener("ws://unused");

        let messages = vec![
            "not json".to_string(),
            r#"{"result":null,"id":1}"#.to_string(),
            ticker_json("XRPUSDT", "abc"),
            ticker_json("XRPUSDT", "NaN"),
            ticker_json("XRPUSDT", "-1"),
            ticker_json("BTCUSDT", "65000.00"),
        ];
        for text in &messages {
            assert!(matches!(
                listener.handle_message(text),
                Err(XrpWatchError::Feed(_))
            ));
        }

        assert!(state.history().is_empty());
        assert_eq!(state.feed().messages_dropped, 6);
        assert_eq!(state.feed().messages_received, 0);
    }

    #[tokio::test]
    async fn test_reconnects_after_close_and_stops_on_shutdown() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let server_task = tokio::spawn(async move {
            for price in ["2.60", "1.90"] {
                let (stream, _) = server.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                ws.send(tungstenite::Message::Text(ticker_json("XRPUSDT", price)))
                    .await
                    .unwrap();
                let _ = ws.close(None).await;
            }
        });

        let (listener, state, mut rx) = new_listener(&format!("ws://{}", addr));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(listener.run(shutdown_rx));

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.condition, AlertCondition::GreaterThan);
        let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.condition, AlertCondition::LessThan);
        server_task.await.unwrap();

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        assert_eq!(state.feed().state, FeedState::Disconnected);
        assert_eq!(state.history().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_live_connection() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        // Keeps the socket open after the first tick and reports the first
        // frame the client sends back.
        let server_task = tokio::spawn(async move {
            let (stream, _) = server.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(tungstenite::Message::Text(ticker_json("XRPUSDT", "2.60")))
                .await
                .unwrap();
            ws.next().await
        });

        let (listener, state, mut rx) = new_listener(&format!("ws://{}", addr));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(listener.run(shutdown_rx));

        timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(state.feed().state, FeedState::Connected);

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        let frame = timeout(Duration::from_secs(5), server_task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(frame, Some(Ok(tungstenite::Message::Close(_)))));
        assert_eq!(state.feed().state, FeedState::Disconnected);
        assert_eq!(state.feed().reconnect_attempts, 0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        // Bind and drop to get a port nothing listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let (listener, state, _rx) = new_listener(&format!("ws://{}", addr));
        let listener = listener.with_backoff(BackoffConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            backoff_factor: 1.0,
            jitter: false,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(listener.run(shutdown_rx));

        // Wait until the first connection attempt has failed.
        timeout(Duration::from_secs(5), async {
            while state.feed().state != FeedState::Reconnecting {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(state.feed().state, FeedState::Disconnected);
        assert_eq!(state.feed().reconnect_attempts, 1);
    }
}
