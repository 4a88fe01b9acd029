use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use price_store::PriceDB;
use strategy_tree::{Comparator, IndicatorKind, Node, Operand, WeightMode, CASH};
use technical_analysis::indicators;

use crate::allocation::Allocation;
use crate::error::EvalWarning;

/// Evaluates a call-free strategy tree (see `StrategyTree::expand_calls`)
/// for one date at a time, memoizing identical sub-trees within a single
/// day so a node reachable through several call sites is only resolved
/// once. The cache is keyed by `Arc` pointer identity plus date, which is
/// sound because `expand_calls`/`compress` guarantee structurally equal
/// sub-trees share one allocation.
pub struct Evaluator {
    cache: RefCell<HashMap<(usize, NaiveDate), Allocation>>,
    warnings: RefCell<Vec<EvalWarning>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            cache: RefCell::new(HashMap::new()),
            warnings: RefCell::new(Vec::new()),
        }
    }

    /// Clear the per-day memoization cache. Call once per new evaluation
    /// date; warnings accumulate across the whole run unless drained.
    pub fn reset_day(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn take_warnings(&self) -> Vec<EvalWarning> {
        std::mem::take(&mut *self.warnings.borrow_mut())
    }

    pub fn evaluate(&self, db: &PriceDB, node: &Arc<Node>, date: NaiveDate) -> Allocation {
        let key = (Arc::as_ptr(node) as usize, date);
        if let Some(cached) = self.cache.borrow().get(&key) {
            return cached.clone();
        }

        let result = self.evaluate_uncached(db, node, date);
        self.cache.borrow_mut().insert(key, result.clone());
        result
    }

    fn evaluate_uncached(&self, db: &PriceDB, node: &Node, date: NaiveDate) -> Allocation {
        match node {
            Node::Position { ticker } if ticker == CASH => Allocation::empty(),

            Node::Position { ticker } => {
                if db.bar_index_on(ticker, date).is_none() {
                    self.warn(EvalWarning::IndicatorLookbackUnavailable {
                        ticker: ticker.clone(),
                        detail: format!("{ticker} has not traded as of {date}"),
                    });
                    return Allocation::empty();
                }
                Allocation::single(ticker.clone(), 1.0)
            }

            Node::Condition { left, comparator, right, if_true, if_false } => {
                match self.compare(db, left, comparator, right, date) {
                    Some(true) => self.evaluate(db, if_true, date),
                    Some(false) => self.evaluate(db, if_false, date),
                    None => {
                        self.warn(EvalWarning::IndicatorLookbackUnavailable {
                            ticker: operand_ticker(left).or_else(|| operand_ticker(right)).unwrap_or_default(),
                            detail: "condition operand unavailable, defaulting to if_false".into(),
                        });
                        self.evaluate(db, if_false, date)
                    }
                }
            }

            Node::Weight { mode, children } => self.evaluate_weight(db, mode, children, date),

            Node::Call { slot } => {
                // Evaluation only ever runs on a tree produced by
                // `StrategyTree::expand_calls`, which inlines every Call.
                self.warn(EvalWarning::IndicatorLookbackUnavailable {
                    ticker: String::new(),
                    detail: format!("unexpanded call to \"{slot}\" reached the evaluator"),
                });
                Allocation::empty()
            }

            Node::FilterRank { candidates, rank_by, select_top, ascending } => {
                self.evaluate_filter_rank(db, candidates, rank_by, *select_top, *ascending, date)
            }
        }
    }

    fn evaluate_weight(&self, db: &PriceDB, mode: &WeightMode, children: &[Arc<Node>], date: NaiveDate) -> Allocation {
        if children.is_empty() {
            return Allocation::empty();
        }

        let weights = match mode {
            WeightMode::Equal => vec![1.0 / children.len() as f64; children.len()],
            WeightMode::Specified(w) => {
                if w.len() == children.len() {
                    w.clone()
                } else {
                    self.warn(EvalWarning::IndicatorLookbackUnavailable {
                        ticker: String::new(),
                        detail: "specified weight count does not match child count, falling back to equal weight".into(),
                    });
                    vec![1.0 / children.len() as f64; children.len()]
                }
            }
            WeightMode::InverseVolatility { period } => self.volatility_weights(db, children, *period, date, true),
            WeightMode::ProVolatility { period } => self.volatility_weights(db, children, *period, date, false),
            WeightMode::Capped { cap } => self.capped_weights(children.len(), *cap),
        };

        let mut allocation = Allocation::empty();
        for (child, w) in children.iter().zip(weights.iter()) {
            let child_alloc = self.evaluate(db, child, date);
            allocation.merge_scaled(&child_alloc, *w);
        }
        allocation
    }

    fn volatility_weights(&self, db: &PriceDB, children: &[Arc<Node>], period: usize, date: NaiveDate, inverse: bool) -> Vec<f64> {
        let mut vols = Vec::with_capacity(children.len());
        for child in children {
            let vol = representative_ticker(child)
                .and_then(|t| db.closes_window(&t, date, period + 1))
                .map(|closes| indicators::volatility(&closes, period).last().copied().unwrap_or(f64::NAN))
                .unwrap_or(f64::NAN);

            let usable = vol.is_finite() && vol > 1e-9;
            vols.push(if !usable { 0.0 } else if inverse { 1.0 / vol } else { vol });
        }

        let total: f64 = vols.iter().sum();
        if total <= 0.0 {
            self.warn(EvalWarning::IndicatorLookbackUnavailable {
                ticker: String::new(),
                detail: "volatility weighting had no usable children, falling back to equal weight".into(),
            });
            return vec![1.0 / children.len() as f64; children.len()];
        }

        vols.iter().map(|v| v / total).collect()
    }

    /// Equal weight capped at `cap` per child; excess redistributed equally
    /// among children still under the cap, iterated to a fixed point.
    fn capped_weights(&self, n: usize, cap: f64) -> Vec<f64> {
        if n == 0 {
            return vec![];
        }
        let cap = cap.clamp(0.0, 1.0);
        let mut weights = vec![1.0 / n as f64; n];
        loop {
            let mut excess = 0.0;
            let mut uncapped = 0usize;
            for w in &mut weights {
                if *w > cap {
                    excess += *w - cap;
                    *w = cap;
                } else {
                    uncapped += 1;
                }
            }
            if excess <= 1e-12 || uncapped == 0 {
                break;
            }
            let share = excess / uncapped as f64;
            for w in &mut weights {
                if *w < cap {
                    *w += share;
                }
            }
        }
        weights
    }

    fn evaluate_filter_rank(
        &self,
        db: &PriceDB,
        candidates: &[Arc<Node>],
        rank_by: &Operand,
        select_top: usize,
        ascending: bool,
        date: NaiveDate,
    ) -> Allocation {
        let mut scored: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let ticker = representative_ticker(c)?;
                let templated = with_ticker(rank_by, &ticker);
                self.eval_operand(db, &templated, date).map(|v| (i, v))
            })
            .collect();

        if scored.is_empty() {
            return Allocation::empty();
        }

        scored.sort_by(|a, b| {
            if ascending {
                a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
            } else {
                b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
            }
        });

        let selected: Vec<usize> = scored.into_iter().take(select_top.max(1)).map(|(i, _)| i).collect();
        if selected.is_empty() {
            return Allocation::empty();
        }

        let weight = 1.0 / selected.len() as f64;
        let mut allocation = Allocation::empty();
        for idx in selected {
            let child_alloc = self.evaluate(db, &candidates[idx], date);
            allocation.merge_scaled(&child_alloc, weight);
        }
        allocation
    }

    fn compare(&self, db: &PriceDB, left: &Operand, comparator: &Comparator, right: &Operand, date: NaiveDate) -> Option<bool> {
        match comparator {
            Comparator::Lt => Some(self.eval_operand(db, left, date)? < self.eval_operand(db, right, date)?),
            Comparator::Gt => Some(self.eval_operand(db, left, date)? > self.eval_operand(db, right, date)?),
            Comparator::CrossAbove | Comparator::CrossBelow => {
                let prev_date = previous_calendar_date(db, date)?;
                let l_now = self.eval_operand(db, left, date)?;
                let r_now = self.eval_operand(db, right, date)?;
                let l_prev = self.eval_operand(db, left, prev_date)?;
                let r_prev = self.eval_operand(db, right, prev_date)?;

                Some(match comparator {
                    Comparator::CrossAbove => l_prev <= r_prev && l_now > r_now,
                    Comparator::CrossBelow => l_prev >= r_prev && l_now < r_now,
                    _ => unreachable!(),
                })
            }
        }
    }

    fn eval_operand(&self, db: &PriceDB, operand: &Operand, date: NaiveDate) -> Option<f64> {
        match operand {
            Operand::Constant(v) => Some(*v),
            Operand::Ratio { numerator, denominator } => {
                let n = self.eval_operand(db, numerator, date)?;
                let d = self.eval_operand(db, denominator, date)?;
                if d.abs() < 1e-12 {
                    None
                } else {
                    Some(n / d)
                }
            }
            Operand::Indicator { kind, ticker, period } => eval_indicator(db, *kind, ticker, *period, date),
        }
    }

    fn warn(&self, w: EvalWarning) {
        tracing::warn!(?w, "evaluator warning");
        self.warnings.borrow_mut().push(w);
    }
}

fn eval_indicator(db: &PriceDB, kind: IndicatorKind, ticker: &str, period: usize, date: NaiveDate) -> Option<f64> {
    match kind {
        IndicatorKind::CurrentPrice => db.bar_index_on(ticker, date).and_then(|i| db.bars(ticker)?.get(i)).map(|b| b.close),
        IndicatorKind::Sma => db.closes_window(ticker, date, period).map(|c| indicators::sma(&c, period)).and_then(|v| v.last().copied()),
        IndicatorKind::Ema => db.closes_window(ticker, date, period).map(|c| indicators::ema(&c, period)).and_then(|v| v.last().copied()),
        IndicatorKind::Rsi => db
            .closes_window(ticker, date, period + 1)
            .map(|c| indicators::rsi(&c, period))
            .and_then(|v| v.last().copied()),
        IndicatorKind::MacdLine => db
            .closes_window(ticker, date, period.max(35))
            .map(|c| indicators::macd(&c, 12, 26, 9).macd_line)
            .and_then(|v| v.last().copied()),
        IndicatorKind::MacdSignal => db
            .closes_window(ticker, date, period.max(35))
            .map(|c| indicators::macd(&c, 12, 26, 9).signal_line)
            .and_then(|v| v.last().copied()),
        IndicatorKind::MacdHistogram => db
            .closes_window(ticker, date, period.max(35))
            .map(|c| indicators::macd(&c, 12, 26, 9).histogram)
            .and_then(|v| v.last().copied()),
        IndicatorKind::BollingerUpper => db
            .closes_window(ticker, date, period)
            .map(|c| indicators::bollinger_bands(&c, period, 2.0).upper)
            .and_then(|v| v.last().copied()),
        IndicatorKind::BollingerLower => db
            .closes_window(ticker, date, period)
            .map(|c| indicators::bollinger_bands(&c, period, 2.0).lower)
            .and_then(|v| v.last().copied()),
        IndicatorKind::Atr => db.bars_window(ticker, date, period + 1).map(|bars| indicators::atr(bars, period)).and_then(|v| v.last().copied()),
        IndicatorKind::Adx => db
            .bars_window(ticker, date, period * 2 + 1)
            .map(|bars| indicators::adx(bars, period).adx)
            .and_then(|v| v.last().copied()),
        IndicatorKind::StochasticK => db
            .bars_window(ticker, date, period)
            .map(|bars| indicators::stochastic(bars, period, 3).k)
            .and_then(|v| v.last().copied()),
        IndicatorKind::StochasticD => db
            .bars_window(ticker, date, period + 3)
            .map(|bars| indicators::stochastic(bars, period, 3).d)
            .and_then(|v| v.last().copied()),
        IndicatorKind::Volatility => db
            .closes_window(ticker, date, period + 1)
            .map(|c| indicators::volatility(&c, period))
            .and_then(|v| v.last().copied()),
    }
}

fn previous_calendar_date(db: &PriceDB, date: NaiveDate) -> Option<NaiveDate> {
    let idx = db.calendar.iter().position(|d| *d == date)?;
    if idx == 0 {
        None
    } else {
        Some(db.calendar[idx - 1])
    }
}

fn operand_ticker(operand: &Operand) -> Option<String> {
    match operand {
        Operand::Indicator { ticker, .. } => Some(ticker.clone()),
        Operand::Ratio { numerator, .. } => operand_ticker(numerator),
        Operand::Constant(_) => None,
    }
}

fn with_ticker(operand: &Operand, ticker: &str) -> Operand {
    match operand {
        Operand::Indicator { kind, period, .. } => Operand::Indicator { kind: *kind, ticker: ticker.to_string(), period: *period },
        Operand::Ratio { numerator, denominator } => Operand::Ratio {
            numerator: Box::new(with_ticker(numerator, ticker)),
            denominator: Box::new(with_ticker(denominator, ticker)),
        },
        Operand::Constant(v) => Operand::Constant(*v),
    }
}

/// The single ticker a sub-tree allocates to, if it unconditionally
/// resolves to one `Position` — used by `FilterRank` and
/// inverse-volatility weighting, both of which rank/weight by a ticker's
/// own indicator value rather than a pre-computed allocation.
fn representative_ticker(node: &Node) -> Option<String> {
    match node {
        Node::Position { ticker } => Some(ticker.clone()),
        _ => None,
    }
}
