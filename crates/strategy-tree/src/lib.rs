pub mod error;
pub mod node;
pub mod tree;

pub use error::TreeError;
pub use node::{Comparator, IndicatorKind, Node, Operand, WeightMode, CASH};
pub use tree::StrategyTree;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn spy_above_sma_tree() -> StrategyTree {
        let root = Arc::new(Node::Condition {
            left: Operand::Indicator { kind: IndicatorKind::CurrentPrice, ticker: "SPY".into(), period: 1 },
            comparator: Comparator::Gt,
            right: Operand::Indicator { kind: IndicatorKind::Sma, ticker: "SPY".into(), period: 200 },
            if_true: Node::position("QQQ"),
            if_false: Node::position("BIL"),
        });
        StrategyTree::new(root)
    }

    #[test]
    fn ensure_slots_passes_for_call_free_tree() {
        assert!(spy_above_sma_tree().ensure_slots().is_ok());
    }

    #[test]
    fn ensure_slots_rejects_unknown_call() {
        let tree = StrategyTree::new(Arc::new(Node::Call { slot: "missing".into() }));
        assert!(matches!(tree.ensure_slots(), Err(TreeError::UnknownCall(_))));
    }

    #[test]
    fn ensure_slots_rejects_self_referencing_slot() {
        let tree = StrategyTree::new(Node::position("SPY")).with_slot("a", Arc::new(Node::Call { slot: "a".into() }));
        // "a" is unreferenced from root, but still part of the persisted tree and must be acyclic.
        assert!(matches!(tree.ensure_slots(), Err(TreeError::CallCycle(_))));
    }

    #[test]
    fn expand_calls_inlines_slot_contents() {
        let tree = StrategyTree::new(Arc::new(Node::Call { slot: "leaf".into() })).with_slot("leaf", Node::position("SPY"));
        let expanded = tree.expand_calls().unwrap();
        assert!(matches!(expanded.as_ref(), Node::Position { ticker } if ticker == "SPY"));
    }

    #[test]
    fn tickers_collects_from_conditions_and_positions() {
        let mut tickers = spy_above_sma_tree().tickers();
        tickers.sort();
        assert_eq!(tickers, vec!["BIL".to_string(), "QQQ".to_string(), "SPY".to_string()]);
    }

    #[test]
    fn validate_non_empty_rejects_childless_weight_root() {
        let tree = StrategyTree::new(Arc::new(Node::Weight { mode: WeightMode::Equal, children: vec![] }));
        assert!(matches!(tree.validate_non_empty(), Err(TreeError::EmptyStrategy)));
    }

    #[test]
    fn validate_non_empty_accepts_position_root() {
        assert!(StrategyTree::new(Node::position("SPY")).validate_non_empty().is_ok());
    }

    #[test]
    fn compress_shares_structurally_identical_subtrees() {
        let weight = Node::position("SPY");
        let tree = StrategyTree::new(Arc::new(Node::Weight {
            mode: WeightMode::Equal,
            children: vec![Node::position("SPY"), weight.clone()],
        }));
        let compressed = tree.compress();
        if let Node::Weight { children, .. } = compressed.root.as_ref() {
            assert!(Arc::ptr_eq(&children[0], &children[1]));
        } else {
            panic!("expected weight root");
        }
    }
}
