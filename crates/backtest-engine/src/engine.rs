use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use evaluator::Evaluator;
use price_store::PriceDB;
use strategy_tree::{Node, Operand, WeightMode};
use technical_analysis::indicators;

use crate::error::BacktestError;
use crate::models::{
    BacktestMetrics, BacktestMode, BacktestResult, BenchmarkComparison, DrawdownPoint, EquityPoint, SplitConfig,
};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Run a strategy tree over a price store, producing one realized return per
/// evaluable trading day. `cost_bps` is a flat per-unit-turnover cost, e.g.
/// `10.0` means 10 basis points of the traded notional.
pub fn run(
    tree: &Arc<Node>,
    db: &PriceDB,
    mode: BacktestMode,
    cost_bps: f64,
    benchmark_ticker: Option<&str>,
    split: Option<&SplitConfig>,
) -> Result<BacktestResult, BacktestError> {
    if db.calendar.len() < 3 {
        return Err(BacktestError::InsufficientData("price store has fewer than 3 trading days".into()));
    }

    let lookback = max_lookback(tree);
    let inception_floor = db.inception_index.values().copied().max().unwrap_or(0);
    let start_index = inception_floor.max(lookback);
    let last_usable = db.calendar.len().saturating_sub(2);

    if start_index > last_usable || last_usable - start_index < 2 {
        let limiting = db.limiting_ticker().unwrap_or("?");
        return Err(BacktestError::InsufficientData(format!(
            "not enough trading days after warm-up (limiting ticker: {limiting}, lookback: {lookback})"
        )));
    }

    let evaluator = Evaluator::new();
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut equity_curve = vec![EquityPoint { date: db.calendar[start_index], equity }];
    let mut drawdown_curve = vec![DrawdownPoint { date: db.calendar[start_index], drawdown: 0.0 }];
    let mut daily_returns = Vec::new();
    let mut allocations = Vec::new();
    let mut turnovers = Vec::new();
    let mut holdings_counts = Vec::new();
    let mut warnings = Vec::new();

    let mut prev_weights: Option<HashMap<String, f64>> = None;

    for i in start_index..=last_usable {
        let date = db.calendar[i];
        evaluator.reset_day();
        let allocation = evaluator.evaluate(db, tree, date);

        // The first evaluated day has no prior allocation to turn over from —
        // entering a position isn't rebalancing, so it contributes no turnover.
        let turnover = match &prev_weights {
            Some(prev) => {
                let turnover = turnover_between(prev, &allocation.weights);
                turnovers.push(turnover);
                turnover
            }
            None => 0.0,
        };
        holdings_counts.push(allocation.weights.iter().filter(|(_, w)| w.abs() > 1e-9).count());

        let gross_return: f64 = allocation
            .weights
            .iter()
            .map(|(ticker, weight)| weight * ticker_return(db, ticker, i, mode).unwrap_or(0.0))
            .sum();
        let cost = (cost_bps / 10_000.0) * turnover;
        let net_return = gross_return - cost;

        equity *= 1.0 + net_return;
        peak = peak.max(equity);
        let drawdown = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };

        let next_date = db.calendar[i + 1];
        equity_curve.push(EquityPoint { date: next_date, equity });
        drawdown_curve.push(DrawdownPoint { date: next_date, drawdown });
        daily_returns.push(net_return);
        allocations.push(allocation.weights.clone());
        prev_weights = Some(allocation.weights);
    }

    for w in evaluator.take_warnings() {
        warnings.push(format!("{w:?}"));
    }

    let avg_turnover = mean(&turnovers);
    let avg_holdings = mean(&holdings_counts.iter().map(|n| *n as f64).collect::<Vec<_>>());

    let benchmark = benchmark_ticker.and_then(|ticker| {
        build_benchmark_comparison(db, ticker, start_index, last_usable, &equity_curve, mode)
    });
    let benchmark_closes: Option<Vec<f64>> = benchmark.as_ref().map(|b| b.equity_curve.iter().map(|p| p.equity).collect());

    let metrics = compute_metrics(&daily_returns, &equity_curve, &drawdown_curve, &allocations, avg_turnover, avg_holdings, benchmark_closes.as_deref());

    // in/out-of-sample slices report the whole run's avg_turnover/avg_holdings
    // rather than recomputing over just their own days.
    let (in_sample_metrics, out_of_sample_metrics, out_of_sample_start) = match split {
        None => (None, None, None),
        Some(cfg) => split_metrics(cfg, &daily_returns, &equity_curve, &drawdown_curve, &allocations, avg_turnover, avg_holdings, benchmark_closes.as_deref()),
    };

    Ok(BacktestResult {
        mode,
        start_date: db.calendar[start_index],
        end_date: db.calendar[last_usable + 1],
        equity_curve,
        drawdown_curve,
        daily_returns,
        allocations,
        metrics,
        in_sample_metrics,
        out_of_sample_metrics,
        out_of_sample_start,
        benchmark,
        warnings,
    })
}

/// Walks the tree with an explicit stack (never recursion — trees built by
/// a sweep can nest deeply through `Call` expansion) collecting the longest
/// indicator lookback reachable anywhere in it, so the run can start once
/// every referenced indicator has enough trailing history.
fn max_lookback(root: &Arc<Node>) -> usize {
    let mut max = 0usize;
    let mut stack = vec![root.clone()];

    while let Some(node) = stack.pop() {
        match node.as_ref() {
            Node::Position { .. } => {}
            Node::Condition { left, right, if_true, if_false, .. } => {
                max = max.max(operand_lookback(left)).max(operand_lookback(right));
                stack.push(if_true.clone());
                stack.push(if_false.clone());
            }
            Node::Weight { mode, children } => {
                if let WeightMode::InverseVolatility { period } | WeightMode::ProVolatility { period } = mode {
                    max = max.max(*period);
                }
                stack.extend(children.iter().cloned());
            }
            Node::Call { .. } => {}
            Node::FilterRank { candidates, rank_by, .. } => {
                max = max.max(operand_lookback(rank_by));
                stack.extend(candidates.iter().cloned());
            }
        }
    }

    max
}

fn operand_lookback(operand: &Operand) -> usize {
    match operand {
        Operand::Indicator { period, .. } => *period,
        Operand::Ratio { numerator, denominator } => operand_lookback(numerator).max(operand_lookback(denominator)),
        Operand::Constant(_) => 0,
    }
}

fn turnover_between(prev: &HashMap<String, f64>, next: &HashMap<String, f64>) -> f64 {
    let mut tickers: Vec<&str> = prev.keys().map(|s| s.as_str()).collect();
    tickers.extend(next.keys().map(|s| s.as_str()));
    tickers.sort_unstable();
    tickers.dedup();

    let gross: f64 = tickers
        .into_iter()
        .map(|t| (next.get(t).copied().unwrap_or(0.0) - prev.get(t).copied().unwrap_or(0.0)).abs())
        .sum();
    0.5 * gross
}

/// The realized one-day return for `ticker` at calendar index `i`, under
/// `mode`'s entry/exit price convention. The tree is always evaluated using
/// that day's close-based indicators; the mode only changes which OHLC
/// fields of day `i` and day `i + 1` the P&L is measured between.
fn ticker_return(db: &PriceDB, ticker: &str, i: usize, mode: BacktestMode) -> Option<f64> {
    let bars = db.bars(ticker)?;
    let idx = db.bar_index_on(ticker, db.calendar[i])?;
    let next_idx = db.bar_index_on(ticker, db.calendar[i + 1])?;
    let today = bars.get(idx)?;
    let tomorrow = bars.get(next_idx)?;

    let (entry, exit) = match mode {
        BacktestMode::CloseClose => (today.close, tomorrow.close),
        BacktestMode::CloseOpen => (today.close, tomorrow.open),
        BacktestMode::OpenOpen => (today.open, tomorrow.open),
        BacktestMode::OpenClose => (today.open, today.close),
    };

    if entry.abs() < 1e-12 {
        None
    } else {
        Some(exit / entry - 1.0)
    }
}

fn build_benchmark_comparison(
    db: &PriceDB,
    ticker: &str,
    start_index: usize,
    last_usable: usize,
    strategy_curve: &[EquityPoint],
    mode: BacktestMode,
) -> Option<BenchmarkComparison> {
    if db.bars(ticker).is_none() {
        return None;
    }

    let mut equity = 1.0_f64;
    let mut curve = vec![EquityPoint { date: db.calendar[start_index], equity }];
    for i in start_index..=last_usable {
        let r = ticker_return(db, ticker, i, mode).unwrap_or(0.0);
        equity *= 1.0 + r;
        curve.push(EquityPoint { date: db.calendar[i + 1], equity });
    }

    let total_return = curve.last()?.equity / curve.first()?.equity - 1.0;
    let strategy_return = strategy_curve.last()?.equity / strategy_curve.first()?.equity - 1.0;

    Some(BenchmarkComparison {
        ticker: ticker.to_string(),
        total_return,
        alpha: strategy_return - total_return,
        equity_curve: curve,
    })
}

fn split_metrics(
    cfg: &SplitConfig,
    daily_returns: &[f64],
    equity_curve: &[EquityPoint],
    drawdown_curve: &[DrawdownPoint],
    allocations: &[HashMap<String, f64>],
    avg_turnover: f64,
    avg_holdings: f64,
    benchmark_closes: Option<&[f64]>,
) -> (Option<BacktestMetrics>, Option<BacktestMetrics>, Option<NaiveDate>) {
    match cfg {
        SplitConfig::Chronological { is_fraction } => {
            let n = daily_returns.len();
            let split_at = ((n as f64) * is_fraction.clamp(0.0, 1.0)).round() as usize;
            if split_at == 0 || split_at >= n {
                return (None, None, None);
            }
            let is = slice_metrics(
                &daily_returns[..split_at],
                &equity_curve[..=split_at],
                &drawdown_curve[..=split_at],
                &allocations[..split_at],
                avg_turnover,
                avg_holdings,
                benchmark_closes,
            );
            let oos = slice_metrics(
                &daily_returns[split_at..],
                &equity_curve[split_at..],
                &drawdown_curve[split_at..],
                &allocations[split_at..],
                avg_turnover,
                avg_holdings,
                benchmark_closes,
            );
            (Some(is), Some(oos), Some(equity_curve[split_at].date))
        }
        SplitConfig::Rolling { window_days, step_days } => {
            let n = daily_returns.len();
            if *window_days == 0 || *step_days == 0 || n <= *window_days {
                return (None, None, None);
            }

            let mut oos_returns = Vec::new();
            let mut oos_equity = vec![EquityPoint { date: equity_curve[0].date, equity: 1.0 }];
            let mut oos_allocations = Vec::new();
            let mut equity = 1.0_f64;
            let mut first_oos_start = None;
            let mut cursor = 0usize;

            while cursor + window_days < n {
                let oos_start = cursor + window_days;
                let oos_end = (oos_start + step_days).min(n);
                if first_oos_start.is_none() {
                    first_oos_start = Some(equity_curve[oos_start + 1].date);
                }
                for day in oos_start..oos_end {
                    let r = daily_returns[day];
                    equity *= 1.0 + r;
                    oos_returns.push(r);
                    oos_equity.push(EquityPoint { date: equity_curve[day + 1].date, equity });
                    oos_allocations.push(allocations[day].clone());
                }
                cursor += step_days;
            }

            if oos_returns.is_empty() {
                return (None, None, None);
            }

            let mut peak = 1.0_f64;
            let oos_drawdown: Vec<DrawdownPoint> = oos_equity
                .iter()
                .map(|p| {
                    peak = peak.max(p.equity);
                    DrawdownPoint { date: p.date, drawdown: if peak > 0.0 { (peak - p.equity) / peak } else { 0.0 } }
                })
                .collect();

            let oos =
                slice_metrics(&oos_returns, &oos_equity, &oos_drawdown, &oos_allocations, avg_turnover, avg_holdings, benchmark_closes);
            (None, Some(oos), first_oos_start)
        }
    }
}

fn slice_metrics(
    returns: &[f64],
    equity_curve: &[EquityPoint],
    drawdown_curve: &[DrawdownPoint],
    allocations: &[HashMap<String, f64>],
    avg_turnover: f64,
    avg_holdings: f64,
    benchmark_closes: Option<&[f64]>,
) -> BacktestMetrics {
    compute_metrics(returns, equity_curve, drawdown_curve, allocations, avg_turnover, avg_holdings, benchmark_closes)
}

fn compute_metrics(
    daily_returns: &[f64],
    equity_curve: &[EquityPoint],
    drawdown_curve: &[DrawdownPoint],
    allocations: &[HashMap<String, f64>],
    avg_turnover: f64,
    avg_holdings: f64,
    benchmark_closes: Option<&[f64]>,
) -> BacktestMetrics {
    let trading_days = daily_returns.len();
    let total_return = match (equity_curve.first(), equity_curve.last()) {
        (Some(first), Some(last)) if first.equity > 0.0 => last.equity / first.equity - 1.0,
        _ => 0.0,
    };

    let years = trading_days as f64 / TRADING_DAYS_PER_YEAR;
    let cagr = if years > 0.0 && total_return > -1.0 {
        (1.0 + total_return).powf(1.0 / years) - 1.0
    } else {
        0.0
    };

    let mean_return = mean(daily_returns);
    let volatility = std_dev(daily_returns, mean_return) * TRADING_DAYS_PER_YEAR.sqrt();

    let max_drawdown = drawdown_curve.iter().map(|p| p.drawdown).fold(0.0_f64, f64::max);

    let sharpe = if volatility > 1e-12 {
        (mean_return * TRADING_DAYS_PER_YEAR) / volatility
    } else {
        0.0
    };

    let downside: Vec<f64> = daily_returns.iter().copied().filter(|r| *r < 0.0).collect();
    let sortino = if downside.is_empty() {
        99.99
    } else {
        let downside_dev = std_dev(&downside, 0.0) * TRADING_DAYS_PER_YEAR.sqrt();
        if downside_dev > 1e-12 {
            (mean_return * TRADING_DAYS_PER_YEAR) / downside_dev
        } else {
            99.99
        }
    };

    let calmar = if max_drawdown > 1e-12 { cagr / max_drawdown } else { 0.0 };

    let win_rate = if trading_days > 0 {
        daily_returns.iter().filter(|r| **r > 0.0).count() as f64 / trading_days as f64
    } else {
        0.0
    };

    let time_in_market = if trading_days > 0 {
        allocations.iter().filter(|day| day.values().sum::<f64>() > 1e-9).count() as f64 / trading_days as f64
    } else {
        0.0
    };
    let timar = cagr * time_in_market;

    let best_day = daily_returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let worst_day = daily_returns.iter().copied().fold(f64::INFINITY, f64::min);

    let (beta, treynor) = match benchmark_closes {
        Some(bench) if bench.len() >= 3 => {
            let strategy_closes: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
            let b = indicators::beta(&strategy_closes, bench);
            if b.is_finite() && b.abs() > 1e-9 {
                (Some(b), Some((mean_return * TRADING_DAYS_PER_YEAR) / b))
            } else {
                (b.is_finite().then_some(b), None)
            }
        }
        _ => (None, None),
    };

    BacktestMetrics {
        total_return,
        cagr,
        volatility,
        max_drawdown,
        sharpe,
        sortino,
        calmar,
        treynor,
        beta,
        win_rate,
        avg_turnover,
        avg_holdings,
        time_in_market,
        timar,
        best_day: indicators::finite_or(best_day, 0.0),
        worst_day: indicators::finite_or(worst_day, 0.0),
        trading_days,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
