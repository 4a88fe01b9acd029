use std::collections::HashMap;

use backtest_engine::{BacktestMetrics, BacktestResult};
use branch_generator::Branch;
use serde::{Deserialize, Serialize};

use crate::signature::pattern_signature;

/// A metric `BacktestMetrics` exposes for hard requirements and ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKey {
    TotalReturn,
    Cagr,
    Volatility,
    MaxDrawdown,
    Sharpe,
    Sortino,
    Calmar,
    WinRate,
    AvgTurnover,
    AvgHoldings,
    TimeInMarket,
    Timar,
    BestDay,
    WorstDay,
}

impl MetricKey {
    pub fn extract(self, m: &BacktestMetrics) -> f64 {
        match self {
            MetricKey::TotalReturn => m.total_return,
            MetricKey::Cagr => m.cagr,
            MetricKey::Volatility => m.volatility,
            MetricKey::MaxDrawdown => m.max_drawdown,
            MetricKey::Sharpe => m.sharpe,
            MetricKey::Sortino => m.sortino,
            MetricKey::Calmar => m.calmar,
            MetricKey::WinRate => m.win_rate,
            MetricKey::AvgTurnover => m.avg_turnover,
            MetricKey::AvgHoldings => m.avg_holdings,
            MetricKey::TimeInMarket => m.time_in_market,
            MetricKey::Timar => m.timar,
            MetricKey::BestDay => m.best_day,
            MetricKey::WorstDay => m.worst_day,
        }
    }

    /// Ranking direction: drawdown and volatility rank best-first ascending,
    /// every return/risk-adjusted metric ranks best-first descending.
    fn higher_is_better(self) -> bool {
        !matches!(self, MetricKey::MaxDrawdown | MetricKey::Volatility)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdComparator {
    AtLeast,
    AtMost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardRequirement {
    pub metric: MetricKey,
    pub comparator: ThresholdComparator,
    pub value: f64,
}

impl HardRequirement {
    pub fn passes(&self, metrics: &BacktestMetrics) -> bool {
        let observed = self.metric.extract(metrics);
        match self.comparator {
            ThresholdComparator::AtLeast => observed >= self.value,
            ThresholdComparator::AtMost => observed <= self.value,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Selection {
    TopOverall(usize),
    TopPerPattern(usize),
}

/// Which metric set a hard requirement or ranking is evaluated against.
/// Falls back to the run's overall metrics when the result carries no
/// split (no in-sample/out-of-sample distinction to make).
fn evaluation_metrics(result: &BacktestResult) -> BacktestMetrics {
    result.in_sample_metrics.unwrap_or(result.metrics)
}

fn rank_cmp(rank_by: MetricKey, a: &BacktestResult, b: &BacktestResult) -> std::cmp::Ordering {
    let (ma, mb) = (rank_by.extract(&evaluation_metrics(a)), rank_by.extract(&evaluation_metrics(b)));
    let ord = ma.partial_cmp(&mb).unwrap_or(std::cmp::Ordering::Equal);
    if rank_by.higher_is_better() {
        ord.reverse()
    } else {
        ord
    }
}

/// Applies the full filter/rank/select pipeline: drop branches failing any
/// hard requirement, sort survivors by `rank_by`, then keep either the
/// overall top-X or the top-X of each pattern bucket.
pub fn filter_rank_select(
    candidates: Vec<(Branch, BacktestResult)>,
    requirements: &[HardRequirement],
    rank_by: MetricKey,
    selection: Selection,
) -> Vec<(Branch, BacktestResult)> {
    let mut survivors: Vec<(Branch, BacktestResult)> = candidates
        .into_iter()
        .filter(|(_, result)| requirements.iter().all(|req| req.passes(&evaluation_metrics(result))))
        .collect();

    survivors.sort_by(|a, b| rank_cmp(rank_by, &a.1, &b.1));

    let selected = match selection {
        Selection::TopOverall(k) => survivors.into_iter().take(k).collect(),
        Selection::TopPerPattern(k) => {
            let mut per_pattern: HashMap<u64, Vec<(Branch, BacktestResult)>> = HashMap::new();
            for item in survivors {
                let sig = pattern_signature(&item.0.tree);
                per_pattern.entry(sig.hash).or_default().push(item);
            }
            let mut selected: Vec<(Branch, BacktestResult)> =
                per_pattern.into_values().flat_map(|bucket| bucket.into_iter().take(k)).collect();
            selected.sort_by(|a, b| rank_cmp(rank_by, &a.1, &b.1));
            selected
        }
    };

    selected
}
