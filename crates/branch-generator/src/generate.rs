use std::sync::Arc;

use strategy_tree::{Comparator, IndicatorKind, Node, Operand};
use uuid::Uuid;

use crate::branch::{Branch, BranchParams};
use crate::config::BranchConfig;

fn gate_node(kind: IndicatorKind, ticker: &str, period: usize, comparator: Comparator, threshold: f64, if_true: Arc<Node>) -> Arc<Node> {
    Arc::new(Node::Condition {
        left: Operand::Indicator { kind, ticker: ticker.to_string(), period },
        comparator,
        right: Operand::Constant(threshold),
        if_true,
        if_false: Node::cash(),
    })
}

/// Materialise every branch the config's Cartesian product describes. See
/// `BranchConfig::estimate_count` for the size without building any trees.
pub fn generate(config: &BranchConfig) -> Vec<Branch> {
    let gate = &config.gate;
    let position_ticker_for = |ticker: &str| gate.alt_ticker.clone().unwrap_or_else(|| ticker.to_string());

    let mut branches = Vec::new();

    for ticker in &gate.tickers {
        for &period in &gate.periods() {
            for &comparator in &gate.comparators() {
                for &threshold in &gate.thresholds() {
                    let leaf = Node::position(position_ticker_for(ticker));

                    match &config.l2 {
                        None => {
                            let tree = gate_node(gate.indicator, ticker, period, comparator, threshold, leaf);
                            branches.push(Branch {
                                id: Uuid::new_v4(),
                                tree,
                                params: BranchParams {
                                    ticker: ticker.clone(),
                                    period,
                                    comparator,
                                    threshold,
                                    l2_period: None,
                                    l2_comparator: None,
                                    l2_threshold: None,
                                },
                            });
                        }
                        Some(l2) => {
                            for &l2_period in &l2.periods() {
                                for &l2_comparator in &l2.comparators() {
                                    for &l2_threshold in &l2.thresholds() {
                                        let inner = gate_node(l2.indicator, ticker, l2_period, l2_comparator, l2_threshold, leaf.clone());
                                        let tree = gate_node(gate.indicator, ticker, period, comparator, threshold, inner);
                                        branches.push(Branch {
                                            id: Uuid::new_v4(),
                                            tree,
                                            params: BranchParams {
                                                ticker: ticker.clone(),
                                                period,
                                                comparator,
                                                threshold,
                                                l2_period: Some(l2_period),
                                                l2_comparator: Some(l2_comparator),
                                                l2_threshold: Some(l2_threshold),
                                            },
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    branches
}
