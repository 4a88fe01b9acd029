use std::sync::Arc;

use backtest_engine::BacktestResult;
use branch_generator::Branch;
use strategy_tree::{Node, WeightMode};

/// Assembles the selected branches into one composite strategy: a
/// top-level `Weight` node whose children are the selected branches'
/// trees, verbatim. Each branch's own logic is preserved exactly — only
/// the weighting across branches is new.
pub fn combine(selected: &[(Branch, BacktestResult)], mode: WeightMode) -> Arc<Node> {
    let children: Vec<Arc<Node>> = selected.iter().map(|(branch, _)| branch.tree.clone()).collect();
    Arc::new(Node::Weight { mode, children })
}

#[cfg(test)]
mod tests {
    use backtest_engine::{BacktestMetrics, BacktestMode};
    use branch_generator::BranchParams;
    use chrono::NaiveDate;
    use strategy_tree::Comparator;
    use uuid::Uuid;

    use super::*;

    fn dummy_metrics() -> BacktestMetrics {
        BacktestMetrics {
            total_return: 0.1,
            cagr: 0.1,
            volatility: 0.1,
            max_drawdown: 0.05,
            sharpe: 1.0,
            sortino: 1.0,
            calmar: 1.0,
            treynor: None,
            beta: None,
            win_rate: 0.5,
            avg_turnover: 0.1,
            avg_holdings: 1.0,
            time_in_market: 1.0,
            timar: 0.1,
            best_day: 0.02,
            worst_day: -0.02,
            trading_days: 100,
        }
    }

    fn dummy_result() -> BacktestResult {
        BacktestResult {
            mode: BacktestMode::CloseClose,
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            equity_curve: Vec::new(),
            drawdown_curve: Vec::new(),
            daily_returns: Vec::new(),
            allocations: Vec::new(),
            metrics: dummy_metrics(),
            in_sample_metrics: None,
            out_of_sample_metrics: None,
            out_of_sample_start: None,
            benchmark: None,
            warnings: Vec::new(),
        }
    }

    fn branch(ticker: &str) -> Branch {
        Branch {
            id: Uuid::new_v4(),
            tree: Node::position(ticker),
            params: BranchParams {
                ticker: ticker.to_string(),
                period: 14,
                comparator: Comparator::Gt,
                threshold: 50.0,
                l2_period: None,
                l2_comparator: None,
                l2_threshold: None,
            },
        }
    }

    #[test]
    fn combine_preserves_each_selected_branchs_tree_verbatim() {
        let selected = vec![(branch("AAPL"), dummy_result()), (branch("MSFT"), dummy_result())];
        let composite = combine(&selected, WeightMode::Equal);

        match composite.as_ref() {
            Node::Weight { mode, children } => {
                assert_eq!(*mode, WeightMode::Equal);
                assert_eq!(children.len(), 2);
                assert_eq!(children[0], selected[0].0.tree);
                assert_eq!(children[1], selected[1].0.tree);
            }
            other => panic!("expected a Weight node, got {other:?}"),
        }
    }
}
