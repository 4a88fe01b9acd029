pub mod branch;
pub mod config;
pub mod generate;

pub use branch::{Branch, BranchParams};
pub use config::{BranchConfig, ComparatorChoice, GateConfig};
pub use generate::generate;

#[cfg(test)]
mod tests {
    use strategy_tree::IndicatorKind;

    use super::*;

    fn rsi_sweep() -> BranchConfig {
        BranchConfig {
            gate: GateConfig {
                indicator: IndicatorKind::Rsi,
                period_min: 10,
                period_max: 14,
                tickers: vec!["SPY".into(), "QQQ".into()],
                comparator: ComparatorChoice::Both,
                threshold_min: 20.0,
                threshold_max: 30.0,
                threshold_step: 5.0,
                alt_ticker: None,
            },
            l2: None,
        }
    }

    #[test]
    fn scenario_s3_branch_count_is_sixty() {
        let config = rsi_sweep();
        // 5 periods x 2 tickers x 2 comparators x 3 thresholds = 60
        assert_eq!(config.estimate_count(), 60);
        assert_eq!(generate(&config).len(), 60);
    }

    #[test]
    fn property_p6_estimate_matches_generated_length() {
        let config = rsi_sweep();
        assert_eq!(config.estimate_count(), generate(&config).len());
    }

    #[test]
    fn both_comparator_expands_to_lt_and_gt_branches() {
        let config = BranchConfig {
            gate: GateConfig {
                indicator: IndicatorKind::Rsi,
                period_min: 14,
                period_max: 14,
                tickers: vec!["SPY".into()],
                comparator: ComparatorChoice::Both,
                threshold_min: 30.0,
                threshold_max: 30.0,
                threshold_step: 1.0,
                alt_ticker: None,
            },
            l2: None,
        };

        let branches = generate(&config);
        assert_eq!(branches.len(), 2);
        let comparators: Vec<_> = branches.iter().map(|b| b.params.comparator).collect();
        assert!(comparators.contains(&strategy_tree::Comparator::Lt));
        assert!(comparators.contains(&strategy_tree::Comparator::Gt));
    }

    #[test]
    fn alt_ticker_trades_a_different_instrument_than_the_signal() {
        let config = BranchConfig {
            gate: GateConfig {
                indicator: IndicatorKind::Rsi,
                period_min: 14,
                period_max: 14,
                tickers: vec!["VIX".into()],
                comparator: ComparatorChoice::Gt,
                threshold_min: 25.0,
                threshold_max: 25.0,
                threshold_step: 1.0,
                alt_ticker: Some("SPY".into()),
            },
            l2: None,
        };

        let branch = &generate(&config)[0];
        match branch.tree.as_ref() {
            strategy_tree::Node::Condition { left, if_true, .. } => {
                assert!(matches!(left, strategy_tree::Operand::Indicator { ticker, .. } if ticker == "VIX"));
                assert!(matches!(if_true.as_ref(), strategy_tree::Node::Position { ticker } if ticker == "SPY"));
            }
            _ => panic!("expected condition root"),
        }
    }

    #[test]
    fn l2_gate_multiplies_the_primary_product() {
        let mut config = rsi_sweep();
        config.gate.period_min = 14;
        config.gate.period_max = 14;
        config.gate.comparator = ComparatorChoice::Gt;
        config.gate.tickers = vec!["SPY".into()];
        config.gate.threshold_min = 30.0;
        config.gate.threshold_max = 30.0;
        config.gate.threshold_step = 1.0;

        config.l2 = Some(GateConfig {
            indicator: IndicatorKind::Sma,
            period_min: 50,
            period_max: 51,
            tickers: vec![],
            comparator: ComparatorChoice::Lt,
            threshold_min: 0.0,
            threshold_max: 0.0,
            threshold_step: 1.0,
            alt_ticker: None,
        });

        // 1 primary combination x 2 l2 periods = 2
        assert_eq!(config.estimate_count(), 2);
        assert_eq!(generate(&config).len(), 2);
    }
}
