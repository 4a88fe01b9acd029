pub mod allocation;
pub mod error;
pub mod eval;

pub use allocation::Allocation;
pub use error::{EvalError, EvalWarning};
pub use eval::Evaluator;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use analysis_core::{AnalysisError, Bar, OhlcProvider};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use strategy_tree::{Comparator, IndicatorKind, Node, Operand, WeightMode};

    use super::*;

    struct FixtureProvider;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
            vwap: None,
        }
    }

    #[async_trait]
    impl OhlcProvider for FixtureProvider {
        async fn fetch_ohlc(&self, ticker: &str, _max_bars: usize) -> Result<Vec<Bar>, AnalysisError> {
            match ticker {
                // Rising series so SMA(3) < current price on every evaluated day.
                "UP" => Ok((1..=20).map(|d| bar(d, 100.0 + d as f64)).collect()),
                // Flat series so volatility is ~0 and SMA(3) == current price.
                "FLAT" => Ok((1..=20).map(|d| bar(d, 50.0)).collect()),
                _ => Err(AnalysisError::InvalidData(ticker.to_string())),
            }
        }
    }

    async fn fixture_db() -> price_store::PriceDB {
        price_store::load(&FixtureProvider, &["UP".to_string(), "FLAT".to_string()], 100).await.unwrap()
    }

    #[tokio::test]
    async fn position_node_allocates_fully_to_its_ticker() {
        let db = fixture_db().await;
        let evaluator = Evaluator::new();
        let node = Node::position("UP");

        let alloc = evaluator.evaluate(&db, &node, *db.calendar.last().unwrap());
        assert_eq!(alloc.weights.get("UP"), Some(&1.0));
        assert_eq!(alloc.total_weight(), 1.0);
    }

    #[tokio::test]
    async fn condition_routes_to_if_true_when_price_above_sma() {
        let db = fixture_db().await;
        let evaluator = Evaluator::new();

        let node = Arc::new(Node::Condition {
            left: Operand::Indicator { kind: IndicatorKind::CurrentPrice, ticker: "UP".into(), period: 0 },
            comparator: Comparator::Gt,
            right: Operand::Indicator { kind: IndicatorKind::Sma, ticker: "UP".into(), period: 3 },
            if_true: Node::position("UP"),
            if_false: Node::position("FLAT"),
        });

        let date = *db.calendar.last().unwrap();
        let alloc = evaluator.evaluate(&db, &node, date);
        assert_eq!(alloc.weights.get("UP"), Some(&1.0));
    }

    #[tokio::test]
    async fn condition_falls_back_to_if_false_when_lookback_unavailable() {
        let db = fixture_db().await;
        let evaluator = Evaluator::new();

        let node = Arc::new(Node::Condition {
            left: Operand::Indicator { kind: IndicatorKind::Sma, ticker: "UP".into(), period: 500 },
            comparator: Comparator::Gt,
            right: Operand::Constant(0.0),
            if_true: Node::position("UP"),
            if_false: Node::position("FLAT"),
        });

        let date = *db.calendar.last().unwrap();
        let alloc = evaluator.evaluate(&db, &node, date);
        assert_eq!(alloc.weights.get("FLAT"), Some(&1.0));
        assert!(!evaluator.take_warnings().is_empty());
    }

    #[tokio::test]
    async fn equal_weight_splits_evenly_across_children() {
        let db = fixture_db().await;
        let evaluator = Evaluator::new();

        let node = Arc::new(Node::Weight {
            mode: WeightMode::Equal,
            children: vec![Node::position("UP"), Node::position("FLAT")],
        });

        let alloc = evaluator.evaluate(&db, &node, *db.calendar.last().unwrap());
        assert_eq!(alloc.weights.get("UP"), Some(&0.5));
        assert_eq!(alloc.weights.get("FLAT"), Some(&0.5));
        assert!((alloc.total_weight() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn filter_rank_selects_top_ticker_by_current_price() {
        let db = fixture_db().await;
        let evaluator = Evaluator::new();

        let node = Arc::new(Node::FilterRank {
            candidates: vec![Node::position("UP"), Node::position("FLAT")],
            rank_by: Operand::Indicator { kind: IndicatorKind::CurrentPrice, ticker: String::new(), period: 0 },
            select_top: 1,
            ascending: false,
        });

        let alloc = evaluator.evaluate(&db, &node, *db.calendar.last().unwrap());
        assert_eq!(alloc.weights.get("UP"), Some(&1.0));
        assert_eq!(alloc.weights.get("FLAT"), None);
    }

    #[tokio::test]
    async fn same_subtree_referenced_twice_is_evaluated_once_per_day() {
        let db = fixture_db().await;
        let evaluator = Evaluator::new();
        let shared = Node::position("UP");

        let node = Arc::new(Node::Weight {
            mode: WeightMode::Equal,
            children: vec![shared.clone(), shared],
        });

        let date = *db.calendar.last().unwrap();
        let alloc = evaluator.evaluate(&db, &node, date);
        // Both children resolve to the same ticker, so the full weight lands on it.
        assert_eq!(alloc.weights.get("UP"), Some(&1.0));
    }
}
