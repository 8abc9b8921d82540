//! Live price alerts for a single symbol.
//!
//! A [`FeedListener`](api::binance::ws::FeedListener) consumes the Binance
//! ticker stream, records every price into the shared history and evaluates
//! the alert registry against it. The HTTP API in [`server`] manages alerts
//! and runs trend analysis over the recorded history.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod server;
pub mod state;
