use crate::error::{Result, XrpWatchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    GreaterThan,
    LessThan,
}

impl AlertCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCondition::GreaterThan => "greater_than",
            AlertCondition::LessThan => "less_than",
        }
    }

    /// Strict comparison: a price equal to the threshold never matches.
    pub fn matches(&self, price: f64, threshold: f64) -> bool {
        match self {
            AlertCondition::GreaterThan => price > threshold,
            AlertCondition::LessThan => price < threshold,
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertCondition {
    type Err = XrpWatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "greater_than" => Ok(AlertCondition::GreaterThan),
            "less_than" => Ok(AlertCondition::LessThan),
            other => Err(XrpWatchError::Validation(format!(
                "invalid condition '{}', expected greater_than or less_than",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: u64,
    pub symbol: String,
    pub threshold: f64,
    pub condition: AlertCondition,
    pub enabled: bool,
}

/// An alert as submitted, before it has been validated and given an id.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub symbol: String,
    pub threshold: f64,
    pub condition: AlertCondition,
    pub enabled: bool,
}

impl NewAlert {
    pub fn new(symbol: &str, threshold: f64, condition: AlertCondition) -> Self {
        Self {
            symbol: symbol.to_string(),
            threshold,
            condition,
            enabled: true,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(XrpWatchError::Validation("symbol must not be empty".into()));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(XrpWatchError::Validation(format!(
                "threshold must be a finite non-negative number, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Ordered list of alert rules.
///
/// Positions follow insertion order and shift down on removal. Ids are
/// assigned once and never reused, so they stay valid across removals.
///
/// A matching alert stays enabled and fires again on every later tick that
/// still satisfies its condition.
#[derive(Debug, Default)]
pub struct AlertRegistry {
    alerts: Vec<Alert>,
    next_id: u64,
}

impl AlertRegistry {
    pub fn new() -> Self {
        Self {
            alerts: Vec::new(),
            next_id: 1,
        }
    }

    /// Registry seeded with the two startup alerts for `symbol`.
    pub fn with_defaults(symbol: &str) -> Result<Self> {
        let mut registry = Self::new();
        for alert in [
            NewAlert::new(symbol, 2.50, AlertCondition::GreaterThan),
            NewAlert::new(symbol, 2.00, AlertCondition::LessThan),
        ] {
            registry.add(alert)?;
        }
        Ok(registry)
    }

    /// Appends the alert and returns its position together with the stored copy.
    pub fn add(&mut self, new: NewAlert) -> Result<(usize, Alert)> {
        new.validate()?;

        let id = self.next_id.max(1);
        self.next_id = id + 1;

        let alert = Alert {
            id,
            symbol: new.symbol.trim().to_lowercase(),
            threshold: new.threshold,
            condition: new.condition,
            enabled: new.enabled,
        };
        self.alerts.push(alert.clone());
        Ok((self.alerts.len() - 1, alert))
    }

    pub fn list(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.alerts.iter().filter(|a| a.enabled).count()
    }

    pub fn remove(&mut self, position: usize) -> Result<Alert> {
        if position >= self.alerts.len() {
            return Err(XrpWatchError::NotFound(format!(
                "no alert at index {} ({} alerts)",
                position,
                self.alerts.len()
            )));
        }
        Ok(self.alerts.remove(position))
    }

    pub fn remove_by_id(&mut self, id: u64) -> Result<Alert> {
        let position = self.position_of(id)?;
        Ok(self.alerts.remove(position))
    }

    pub fn set_enabled(&mut self, id: u64, enabled: bool) -> Result<Alert> {
        let position = self.position_of(id)?;
        let alert = &mut self.alerts[position];
        alert.enabled = enabled;
        Ok(alert.clone())
    }

    pub fn position_of(&self, id: u64) -> Result<usize> {
        self.alerts
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| XrpWatchError::NotFound(format!("no alert with id {}", id)))
    }

    /// Every enabled alert on `symbol` whose condition holds for `price`.
    pub fn evaluate(&self, symbol: &str, price: f64) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|a| a.enabled && a.symbol.eq_ignore_ascii_case(symbol))
            .filter(|a| a.condition.matches(price, a.threshold))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(alerts: &[(f64, AlertCondition, bool)]) -> AlertRegistry {
        let mut registry = AlertRegistry::new();
        for &(threshold, condition, enabled) in alerts {
            let mut alert = NewAlert::new("xrpusd", threshold, condition);
            alert.enabled = enabled;
            registry.add(alert).unwrap();
        }
        registry
    }

    #[test]
    fn test_condition_parsing() {
        assert_eq!(
            "greater_than".parse::<AlertCondition>().unwrap(),
            AlertCondition::GreaterThan
        );
        assert_eq!(
            "less_than".parse::<AlertCondition>().unwrap(),
            AlertCondition::LessThan
        );
        assert!(matches!(
            "above".parse::<AlertCondition>(),
            Err(XrpWatchError::Validation(_))
        ));
    }

    #[test]
    fn test_add_returns_position_and_assigns_ids() {
        let mut registry = AlertRegistry::new();
        let (pos0, a0) = registry
            .add(NewAlert::new("XRPUSD", 2.5, AlertCondition::GreaterThan))
            .unwrap();
        let (pos1, a1) = registry
            .add(NewAlert::new("xrpusd", 2.0, AlertCondition::LessThan))
            .unwrap();

        assert_eq!((pos0, pos1), (0, 1));
        assert_ne!(a0.id, a1.id);
        assert_eq!(a0.symbol, "xrpusd");
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_add_rejects_bad_threshold_and_symbol() {
        let mut registry = AlertRegistry::new();
        for threshold in [f64::NAN, f64::INFINITY, -1.0] {
            let result = registry.add(NewAlert::new("xrpusd", threshold, AlertCondition::LessThan));
            assert!(matches!(result, Err(XrpWatchError::Validation(_))));
        }
        let result = registry.add(NewAlert::new("  ", 1.0, AlertCondition::LessThan));
        assert!(matches!(result, Err(XrpWatchError::Validation(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_greater_than_is_strict() {
        let registry = registry_with(&[(2.5, AlertCondition::GreaterThan, true)]);
        assert!(registry.evaluate("xrpusd", 2.4).is_empty());
        assert!(registry.evaluate("xrpusd", 2.5).is_empty());
        assert_eq!(registry.evaluate("xrpusd", 2.6).len(), 1);
    }

    #[test]
    fn test_less_than_is_strict() {
        let registry = registry_with(&[(2.0, AlertCondition::LessThan, true)]);
        assert!(registry.evaluate("xrpusd", 2.1).is_empty());
        assert!(registry.evaluate("xrpusd", 2.0).is_empty());
        assert_eq!(registry.evaluate("xrpusd", 1.9).len(), 1);
    }

    #[test]
    fn test_evaluate_skips_disabled_and_other_symbols() {
        let mut registry = registry_with(&[
            (1.0, AlertCondition::GreaterThan, false),
            (1.0, AlertCondition::GreaterThan, true),
        ]);
        registry
            .add(NewAlert::new("btcusdt", 1.0, AlertCondition::GreaterThan))
            .unwrap();

        let triggered = registry.evaluate("XRPUSD", 5.0);
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].id, registry.list()[1].id);
    }

    #[test]
    fn test_alert_refires_on_every_matching_price() {
        let registry = registry_with(&[(2.5, AlertCondition::GreaterThan, true)]);
        assert_eq!(registry.evaluate("xrpusd", 2.6).len(), 1);
        assert_eq!(registry.evaluate("xrpusd", 2.7).len(), 1);
        assert!(registry.list()[0].enabled);
    }

    #[test]
    fn test_price_scenario() {
        let mut registry = AlertRegistry::new();
        let (_, alert) = registry
            .add(NewAlert::new("xrpusd", 2.50, AlertCondition::GreaterThan))
            .unwrap();

        assert!(registry.evaluate("xrpusd", 2.40).is_empty());
        assert_eq!(registry.evaluate("xrpusd", 2.60), vec![alert]);
    }

    #[test]
    fn test_remove_shifts_positions() {
        let mut registry = AlertRegistry::with_defaults("xrpusd").unwrap();
        let second = registry.list()[1].clone();

        let removed = registry.remove(0).unwrap();
        assert_eq!(removed.condition, AlertCondition::GreaterThan);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list()[0], second);
    }

    #[test]
    fn test_defaults_require_a_symbol() {
        assert!(matches!(
            AlertRegistry::with_defaults("  "),
            Err(XrpWatchError::Validation(_))
        ));

        let registry = AlertRegistry::with_defaults("xrpusd").unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn test_remove_out_of_bounds() {
        let mut registry = AlertRegistry::with_defaults("xrpusd").unwrap();
        assert!(matches!(registry.remove(2), Err(XrpWatchError::NotFound(_))));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_by_id_survives_shifts() {
        let mut registry = AlertRegistry::with_defaults("xrpusd").unwrap();
        let (_, third) = registry
            .add(NewAlert::new("xrpusd", 3.0, AlertCondition::GreaterThan))
            .unwrap();

        registry.remove(0).unwrap();
        let removed = registry.remove_by_id(third.id).unwrap();
        assert_eq!(removed, third);
        assert!(matches!(
            registry.remove_by_id(third.id),
            Err(XrpWatchError::NotFound(_))
        ));
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut registry = AlertRegistry::new();
        let (_, first) = registry
            .add(NewAlert::new("xrpusd", 1.0, AlertCondition::LessThan))
            .unwrap();
        registry.remove(0).unwrap();
        let (_, second) = registry
            .add(NewAlert::new("xrpusd", 1.0, AlertCondition::LessThan))
            .unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn test_set_enabled() {
        let mut registry = AlertRegistry::with_defaults("xrpusd").unwrap();
        let id = registry.list()[0].id;

        let updated = registry.set_enabled(id, false).unwrap();
        assert!(!updated.enabled);
        assert_eq!(registry.active_count(), 1);
        assert!(registry.evaluate("xrpusd", 3.0).is_empty());

        assert!(matches!(
            registry.set_enabled(999, true),
            Err(XrpWatchError::NotFound(_))
        ));
    }
}
