use serde::{Deserialize, Serialize};
use strategy_tree::IndicatorKind;

/// A comparator choice as exposed to sweep configuration. `Both` expands to
/// both `Lt` and `Gt` branches at generation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparatorChoice {
    Lt,
    Gt,
    Both,
}

impl ComparatorChoice {
    fn expand(self) -> Vec<strategy_tree::Comparator> {
        match self {
            ComparatorChoice::Lt => vec![strategy_tree::Comparator::Lt],
            ComparatorChoice::Gt => vec![strategy_tree::Comparator::Gt],
            ComparatorChoice::Both => vec![strategy_tree::Comparator::Lt, strategy_tree::Comparator::Gt],
        }
    }
}

/// One indicator gate: a window of periods crossed with a window of
/// thresholds and a comparator choice, all evaluated against `tickers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub indicator: IndicatorKind,
    pub period_min: usize,
    pub period_max: usize,
    pub tickers: Vec<String>,
    pub comparator: ComparatorChoice,
    pub threshold_min: f64,
    pub threshold_max: f64,
    pub threshold_step: f64,
    /// Position leaves use this ticker instead of the gate's signal ticker,
    /// when set — the gate watches one instrument and trades another.
    pub alt_ticker: Option<String>,
}

impl GateConfig {
    pub(crate) fn periods(&self) -> Vec<usize> {
        if self.period_max < self.period_min {
            return vec![];
        }
        (self.period_min..=self.period_max).collect()
    }

    pub(crate) fn comparators(&self) -> Vec<strategy_tree::Comparator> {
        self.comparator.expand()
    }

    pub(crate) fn thresholds(&self) -> Vec<f64> {
        if self.threshold_step <= 0.0 || self.threshold_max < self.threshold_min {
            return vec![];
        }
        let steps = ((self.threshold_max - self.threshold_min) / self.threshold_step).round() as usize;
        (0..=steps).map(|i| self.threshold_min + i as f64 * self.threshold_step).collect()
    }

    fn axis_count(&self) -> usize {
        self.tickers.len() * self.periods().len() * self.comparators().len() * self.thresholds().len()
    }
}

/// Full sweep configuration: a primary gate, with an optional second gate
/// (L2) applied on top of it to refine selection further. L2 reuses the
/// ticker the primary gate is currently considering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    pub gate: GateConfig,
    pub l2: Option<GateConfig>,
}

impl BranchConfig {
    pub fn estimate_count(&self) -> usize {
        let primary = self.gate.axis_count();
        match &self.l2 {
            Some(l2) => primary * l2.periods().len() * l2.comparators().len() * l2.thresholds().len(),
            None => primary,
        }
    }
}
