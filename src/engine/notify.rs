use crate::engine::alerts::{Alert, AlertCondition};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertNotification {
    pub alert_id: u64,
    pub symbol: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    pub price: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertNotification {
    pub fn new(alert: &Alert, price: f64, timestamp: DateTime<Utc>) -> Self {
        let symbol = alert.symbol.to_uppercase();
        let message = match alert.condition {
            AlertCondition::GreaterThan => format!(
                "{} price crossed above ${} (current: ${:.4})",
                symbol, alert.threshold, price
            ),
            AlertCondition::LessThan => format!(
                "{} price dropped below ${} (current: ${:.4})",
                symbol, alert.threshold, price
            ),
        };

        Self {
            alert_id: alert.id,
            symbol: alert.symbol.clone(),
            condition: alert.condition,
            threshold: alert.threshold,
            price,
            message,
            timestamp,
        }
    }
}

/// Drains the notification channel into the log until every sender is gone.
pub async fn run_notifier(mut receiver: mpsc::Receiver<AlertNotification>) {
    while let Some(notification) = receiver.recv().await {
        warn!("🚨 {}", notification.message);
    }
    info!("Alert notifier stopped");
}
