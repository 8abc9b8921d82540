use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSample {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(symbol: &str, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_lowercase(),
            price,
            timestamp,
        }
    }
}

/// Fixed-capacity FIFO of the most recent samples for one symbol.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, sample: PriceSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// The most recent `n` samples, oldest first. `n` is clamped to the
    /// number of samples held.
    pub fn window(&self, n: usize) -> impl Iterator<Item = &PriceSample> + Clone + '_ {
        let n = n.min(self.samples.len());
        self.samples.iter().skip(self.samples.len() - n)
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
