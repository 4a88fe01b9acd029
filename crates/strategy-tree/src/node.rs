use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Sentinel ticker meaning "cash" — a `Position` holding this contributes no
/// weight to any ticker and needs no price history.
pub const CASH: &str = "";

/// Indicator functions a condition or ranking may reference. Mirrors the
/// pure functions in `technical-analysis::indicators`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndicatorKind {
    CurrentPrice,
    Sma,
    Ema,
    Rsi,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    BollingerUpper,
    BollingerLower,
    Atr,
    Adx,
    StochasticK,
    StochasticD,
    Volatility,
}

/// One side of a condition or the ranking key of a filter-rank node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "op")]
pub enum Operand {
    Indicator {
        kind: IndicatorKind,
        ticker: String,
        period: usize,
    },
    /// Ratio of two operands, e.g. relative-strength style comparisons.
    Ratio {
        numerator: Box<Operand>,
        denominator: Box<Operand>,
    },
    Constant(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparator {
    Lt,
    Gt,
    CrossAbove,
    CrossBelow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum WeightMode {
    /// Split capital evenly across children.
    Equal,
    /// Explicit weights, one per child, must sum to <= 1.0.
    Specified(Vec<f64>),
    /// Weight inversely proportional to each child's trailing volatility.
    InverseVolatility { period: usize },
    /// Weight proportional to each child's trailing volatility.
    ProVolatility { period: usize },
    /// Equal weight capped at `cap` per child; excess redistributed among
    /// uncapped children, iterated to a fixed point.
    Capped { cap: f64 },
}

/// A node in a strategy tree. Children are `Arc`-shared so the same
/// sub-tree (most commonly behind a `Call`) can be referenced from many
/// places without cloning or introducing ownership cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Node {
    /// Allocate 100% of whatever capital reaches this node to `ticker`.
    Position { ticker: String },

    /// Evaluate `left <comparator> right`; route capital to `if_true` or
    /// `if_false` accordingly.
    Condition {
        left: Operand,
        comparator: Comparator,
        right: Operand,
        if_true: Arc<Node>,
        if_false: Arc<Node>,
    },

    /// Split the capital reaching this node across `children` per `mode`.
    Weight { mode: WeightMode, children: Vec<Arc<Node>> },

    /// Reference to a named sub-tree held in `StrategyTree::slots`, so
    /// identical branches across a tree (or across branches in a sweep)
    /// share one evaluation rather than being duplicated and re-evaluated.
    Call { slot: String },

    /// Rank `candidates` by `rank_by` and allocate equally across the
    /// top (or bottom, if `ascending`) `select_top` of them.
    FilterRank {
        candidates: Vec<Arc<Node>>,
        rank_by: Operand,
        select_top: usize,
        ascending: bool,
    },
}

impl Node {
    pub fn position(ticker: impl Into<String>) -> Arc<Node> {
        Arc::new(Node::Position { ticker: ticker.into() })
    }

    pub fn cash() -> Arc<Node> {
        Arc::new(Node::Position { ticker: CASH.to_string() })
    }
}
