use crate::engine::history::PriceSample;
use crate::error::{Result, XrpWatchError};
use serde::Serialize;
use std::fmt;
use ta::{indicators::StandardDeviation, Next};

pub const DEFAULT_TREND_THRESHOLD: f64 = 2.0;
const MIN_SAMPLES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrendDirection::Bullish => "bullish",
            TrendDirection::Bearish => "bearish",
            TrendDirection::Neutral => "neutral",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub direction: TrendDirection,
    pub percent_change: f64,
    pub volatility: f64,
    pub confidence: f64,
    pub summary: String,
    pub price_range: f64,
    pub samples: usize,
    pub first_price: f64,
    pub last_price: f64,
}

/// Heuristic trend classifier over a window of prices.
///
/// Volatility is the population standard deviation of the consecutive
/// percent returns in the window. Confidence grows with the size of the move
/// relative to the classification threshold and shrinks with volatility:
/// `s / (s + 1 + volatility)` where `s = |percent_change| / threshold`.
#[derive(Debug, Clone, Copy)]
pub struct TrendAnalyzer {
    threshold_pct: f64,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_TREND_THRESHOLD)
    }
}

impl TrendAnalyzer {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    pub fn analyze<'a, I>(&self, window: I) -> Result<AnalysisResult>
    where
        I: IntoIterator<Item = &'a PriceSample>,
    {
        let samples: Vec<&PriceSample> = window.into_iter().collect();
        if samples.len() < MIN_SAMPLES {
            return Err(XrpWatchError::InsufficientData {
                required: MIN_SAMPLES,
                available: samples.len(),
            });
        }

        let prices: Vec<f64> = samples.iter().map(|s| s.price).collect();
        let first = prices[0];
        let last = prices[prices.len() - 1];

        let percent_change = percent_between(first, last);
        let direction = if percent_change > self.threshold_pct {
            TrendDirection::Bullish
        } else if percent_change < -self.threshold_pct {
            TrendDirection::Bearish
        } else {
            TrendDirection::Neutral
        };

        let volatility = returns_volatility(&prices)?;
        let strength = percent_change.abs() / self.threshold_pct;
        let confidence = (strength / (strength + 1.0 + volatility)).clamp(0.0, 1.0);

        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);

        let summary = summarize(
            &samples[0].symbol,
            direction,
            percent_change,
            confidence,
            volatility,
            prices.len(),
        );

        Ok(AnalysisResult {
            direction,
            percent_change,
            volatility,
            confidence,
            summary,
            price_range: max - min,
            samples: prices.len(),
            first_price: first,
            last_price: last,
        })
    }
}

fn percent_between(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        return 0.0;
    }
    (to - from) / from * 100.0
}

fn returns_volatility(prices: &[f64]) -> Result<f64> {
    let returns: Vec<f64> = prices
        .windows(2)
        .map(|pair| percent_between(pair[0], pair[1]))
        .collect();

    let mut std_dev = StandardDeviation::new(returns.len())
        .map_err(|e| XrpWatchError::Validation(format!("volatility window: {:?}", e)))?;
    Ok(returns.iter().fold(0.0, |_, &r| std_dev.next(r)))
}

fn summarize(
    symbol: &str,
    direction: TrendDirection,
    percent_change: f64,
    confidence: f64,
    volatility: f64,
    samples: usize,
) -> String {
    let symbol = symbol.to_uppercase();
    match direction {
        TrendDirection::Bullish => format!(
            "📈 {} is showing {} momentum with a {:.2}% gain over {} samples (confidence {:.0}%, volatility {:.4})",
            symbol, direction, percent_change.abs(), samples, confidence * 100.0, volatility
        ),
        TrendDirection::Bearish => format!(
            "📉 {} is trending {} with a {:.2}% decline over {} samples (confidence {:.0}%, volatility {:.4})",
            symbol, direction, percent_change.abs(), samples, confidence * 100.0, volatility
        ),
        TrendDirection::Neutral => format!(
            "⚖️ {} is {}, consolidating with minimal movement ({:.2}%) over {} samples (confidence {:.0}%, volatility {:.4})",
            symbol, direction, percent_change, samples, confidence * 100.0, volatility
        ),
    }
}
