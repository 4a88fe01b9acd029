use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use strategy_tree::{Node, Operand};

/// A branch's pattern identity: two branches sharing a signature differ
/// only in window length and threshold, never in which indicators gate
/// which tickers. `hash` is a cheap grouping key; `canonical` is kept
/// alongside it so two signatures can be compared for exact equality on
/// the rare hash collision rather than trusting the hash alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSignature {
    pub hash: u64,
    pub canonical: String,
}

/// Every ticker a `Position` leaf reachable from `node` allocates to,
/// walked with an explicit stack rather than recursion since a composite
/// tree assembled by `combine` can be arbitrarily deep.
fn reachable_tickers(node: &Arc<Node>) -> BTreeSet<String> {
    let mut tickers = BTreeSet::new();
    let mut stack = vec![node.clone()];
    while let Some(n) = stack.pop() {
        match n.as_ref() {
            Node::Position { ticker } => {
                tickers.insert(ticker.clone());
            }
            Node::Call { .. } => {}
            Node::Condition { if_true, if_false, .. } => {
                stack.push(if_true.clone());
                stack.push(if_false.clone());
            }
            Node::Weight { children, .. } => stack.extend(children.iter().cloned()),
            Node::FilterRank { candidates, .. } => stack.extend(candidates.iter().cloned()),
        }
    }
    tickers
}

fn indicator_kind_of(operand: &Operand) -> Option<String> {
    match operand {
        Operand::Indicator { kind, .. } => Some(format!("{kind:?}")),
        Operand::Ratio { numerator, denominator } => {
            indicator_kind_of(numerator).or_else(|| indicator_kind_of(denominator))
        }
        Operand::Constant(_) => None,
    }
}

/// `sig(tree)`: the canonicalised multiset of `(indicator_kind,
/// comparator_or_rank_direction, sorted(tickers reachable from that
/// node))` across every `Condition`/`FilterRank` node, plus one component
/// per bare `Position` leaf for its own ticker. Window length and
/// threshold never enter the signature — two branches differing only in
/// RSI(10) vs RSI(30) or threshold 30 vs 70 share a pattern.
pub fn pattern_signature(tree: &Arc<Node>) -> PatternSignature {
    let mut components: Vec<String> = Vec::new();
    let mut stack = vec![tree.clone()];

    while let Some(n) = stack.pop() {
        match n.as_ref() {
            Node::Position { ticker } => {
                components.push(format!("position({ticker})"));
            }
            Node::Call { slot } => {
                components.push(format!("call({slot})"));
            }
            Node::Condition { left, comparator, right, if_true, if_false } => {
                let kind = indicator_kind_of(left).or_else(|| indicator_kind_of(right)).unwrap_or_else(|| "none".into());
                let tickers = reachable_tickers(if_true).union(&reachable_tickers(if_false)).cloned().collect::<BTreeSet<_>>();
                components.push(format!("condition({kind},{comparator:?},[{}])", tickers.into_iter().collect::<Vec<_>>().join(",")));
                stack.push(if_true.clone());
                stack.push(if_false.clone());
            }
            Node::Weight { children, .. } => stack.extend(children.iter().cloned()),
            Node::FilterRank { candidates, rank_by, ascending, .. } => {
                let kind = indicator_kind_of(rank_by).unwrap_or_else(|| "none".into());
                let mut tickers = BTreeSet::new();
                for c in candidates {
                    tickers.extend(reachable_tickers(c));
                }
                components.push(format!(
                    "filterRank({kind},ascending={ascending},[{}])",
                    tickers.into_iter().collect::<Vec<_>>().join(",")
                ));
                stack.extend(candidates.iter().cloned());
            }
        }
    }

    components.sort();
    let canonical = components.join("|");
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    PatternSignature { hash: hasher.finish(), canonical }
}

#[cfg(test)]
mod tests {
    use strategy_tree::{Comparator, IndicatorKind};

    use super::*;

    fn gate(ticker: &str, period: usize, threshold: f64) -> Arc<Node> {
        Arc::new(Node::Condition {
            left: Operand::Indicator { ticker: ticker.to_string(), kind: IndicatorKind::Rsi, period },
            comparator: Comparator::Gt,
            right: Operand::Constant(threshold),
            if_true: Node::position(ticker),
            if_false: Node::cash(),
        })
    }

    #[test]
    fn same_indicator_and_tickers_share_a_signature_regardless_of_window_or_threshold() {
        let a = pattern_signature(&gate("AAPL", 10, 30.0));
        let b = pattern_signature(&gate("AAPL", 40, 70.0));
        assert_eq!(a, b);
    }

    #[test]
    fn different_tickers_diverge() {
        let a = pattern_signature(&gate("AAPL", 14, 50.0));
        let b = pattern_signature(&gate("MSFT", 14, 50.0));
        assert_ne!(a, b);
    }

    #[test]
    fn different_indicator_kind_diverges() {
        let rsi_gate = gate("AAPL", 14, 50.0);
        let sma_gate = Arc::new(Node::Condition {
            left: Operand::Indicator { ticker: "AAPL".into(), kind: IndicatorKind::Sma, period: 14 },
            comparator: Comparator::Gt,
            right: Operand::Constant(50.0),
            if_true: Node::position("AAPL"),
            if_false: Node::cash(),
        });
        assert_ne!(pattern_signature(&rsi_gate), pattern_signature(&sma_gate));
    }
}
