use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// When in the trading day a strategy's decision is priced. All four modes
/// evaluate the tree against the same day's close-based indicators; they
/// differ only in which OHLC fields of that day and the next realize the
/// one-day return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BacktestMode {
    /// Decide at today's close, hold close-to-close.
    CloseClose,
    /// Decide at today's close, enter at tomorrow's open.
    CloseOpen,
    /// Hold open-to-open.
    OpenOpen,
    /// Hold open-to-close, same day.
    OpenClose,
}

/// In/out-of-sample split configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SplitConfig {
    /// First `is_fraction` of the evaluable calendar is in-sample, the
    /// remainder out-of-sample.
    Chronological { is_fraction: f64 },
    /// Walk the calendar in fixed-size windows: `window_days` in-sample
    /// followed by `step_days` out-of-sample, repeated until the calendar
    /// is exhausted. OOS sub-series from every fold are concatenated,
    /// unmodified, into one combined OOS curve — see module docs.
    Rolling { window_days: usize, step_days: usize },
}

/// One point on an equity or drawdown curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// One point on the drawdown-from-peak curve. `drawdown` is always a
/// non-negative magnitude (0.10 means 10% below the running peak); sign
/// inversion for display purposes belongs to callers, not this type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DrawdownPoint {
    pub date: NaiveDate,
    pub drawdown: f64,
}

/// The metric set spec'd for a completed run, computed once over whichever
/// slice of the equity curve the caller asks for (full run, in-sample,
/// out-of-sample).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    /// Non-negative magnitude — see `DrawdownPoint`.
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    /// `None` when no benchmark series was supplied (beta is undefined).
    pub treynor: Option<f64>,
    pub beta: Option<f64>,
    pub win_rate: f64,
    /// Mean of the per-day portfolio turnover (sum of |weight delta|).
    pub avg_turnover: f64,
    pub avg_holdings: f64,
    /// Time in market: fraction of evaluable days with nonzero exposure.
    pub time_in_market: f64,
    /// Time-in-market-adjusted return: total_return / time_in_market.
    pub timar: f64,
    pub best_day: f64,
    pub worst_day: f64,
    pub trading_days: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub ticker: String,
    pub total_return: f64,
    /// Strategy total return - benchmark total return.
    pub alpha: f64,
    pub equity_curve: Vec<EquityPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub mode: BacktestMode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub equity_curve: Vec<EquityPoint>,
    pub drawdown_curve: Vec<DrawdownPoint>,
    /// Daily net return (after cost) for each evaluable day, same length and
    /// order as `equity_curve` minus its first point.
    pub daily_returns: Vec<f64>,
    /// Per-day allocation snapshot, ticker -> weight, aligned with
    /// `equity_curve`.
    pub allocations: Vec<HashMap<String, f64>>,
    pub metrics: BacktestMetrics,
    pub in_sample_metrics: Option<BacktestMetrics>,
    pub out_of_sample_metrics: Option<BacktestMetrics>,
    pub out_of_sample_start: Option<NaiveDate>,
    pub benchmark: Option<BenchmarkComparison>,
    pub warnings: Vec<String>,
}
