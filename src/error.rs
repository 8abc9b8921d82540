use thiserror::Error;

#[derive(Error, Debug)]
pub enum XrpWatchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient data: need at least {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Request timed out after {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("No price received yet for {0}")]
    PriceUnavailable(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebsocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl XrpWatchError {
    /// Short machine-readable kind, used as the `error` field of API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            XrpWatchError::Validation(_) => "validation_error",
            XrpWatchError::NotFound(_) => "not_found",
            XrpWatchError::InsufficientData { .. } => "insufficient_data",
            XrpWatchError::RequestTimeout(_) => "request_timeout",
            XrpWatchError::PriceUnavailable(_) => "price_unavailable",
            XrpWatchError::Feed(_) => "feed_error",
            XrpWatchError::Config(_) => "config_error",
            XrpWatchError::WebsocketError(_) => "websocket_error",
            XrpWatchError::JsonError(_) => "invalid_json",
            XrpWatchError::IoError(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, XrpWatchError>;
