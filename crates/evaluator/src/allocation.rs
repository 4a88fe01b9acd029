use std::collections::HashMap;

/// Resolved capital weights for one evaluation day. Weights are
/// non-negative and sum to at most 1.0 — any shortfall is implicitly
/// uninvested cash, never redistributed silently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    pub weights: HashMap<String, f64>,
}

impl Allocation {
    pub fn single(ticker: impl Into<String>, weight: f64) -> Self {
        let mut weights = HashMap::new();
        weights.insert(ticker.into(), weight);
        Self { weights }
    }

    pub fn empty() -> Self {
        Self { weights: HashMap::new() }
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Merge `other`, scaled by `scale`, into `self`.
    pub fn merge_scaled(&mut self, other: &Allocation, scale: f64) {
        for (ticker, w) in &other.weights {
            *self.weights.entry(ticker.clone()).or_insert(0.0) += w * scale;
        }
    }
}
