//! Tree-evaluator-driven backtesting: walks a `strategy_tree::Node` across
//! a `price_store::PriceDB` day by day, realizing returns under one of four
//! entry/exit conventions and assembling the full metric set.
//!
//! Rolling in/out-of-sample splits concatenate each fold's out-of-sample
//! equity sub-series unmodified onto the combined curve — no renormalizing
//! at the splice point. A strategy that loses money in fold 1's OOS window
//! and gains it back in fold 2's does not look flat; the combined curve
//! shows the drawdown.

pub mod engine;
pub mod error;
pub mod models;


pub use engine::run;
pub use error::BacktestError;
pub use models::*;
