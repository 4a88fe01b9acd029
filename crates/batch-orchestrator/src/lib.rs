//! Parallel execution of a branch-generator sweep against a shared,
//! read-only `PriceDB`: content-addressed caching so re-running an
//! overlapping sweep only pays for the branches it hasn't seen, bounded-rate
//! progress reporting, cooperative cancellation, and per-branch failure
//! isolation so one bad tree doesn't take down the rest of the sweep.

pub mod cache;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use backtest_engine::BacktestResult;
use branch_generator::Branch;
use price_store::PriceDB;
use rayon::prelude::*;
use serde::Serialize;
use uuid::Uuid;

pub use cache::{BatchConfig, ResultCache};

/// One branch's outcome from a sweep. `cache_hit` is reported even on an
/// error, since a cached failure from an earlier branch with the same
/// fingerprint is itself a hit.
#[derive(Clone, Serialize)]
pub struct BranchResult {
    pub branch_id: Uuid,
    pub outcome: Arc<Result<BacktestResult, String>>,
    pub cache_hit: bool,
}

/// A running snapshot handed to the progress callback. Emitted once per
/// completed chunk rather than once per branch, per the sweep's bounded-rate
/// reporting requirement.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SweepProgress {
    pub done: usize,
    pub total: usize,
    pub hits: usize,
    pub misses: usize,
}

const DEFAULT_CHUNK_SIZE: usize = 100;

/// Drives one parallel sweep. Holds the result cache and a cancellation
/// flag; both are meant to outlive a single `run_sweep` call so a sweep can
/// be cancelled from another thread and its cache reused by the next sweep
/// over an overlapping branch set.
pub struct Sweep {
    cache: ResultCache,
    cancelled: Arc<AtomicBool>,
}

impl Sweep {
    pub fn new() -> Self {
        Self { cache: ResultCache::new(), cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Runs `branches` against `db` under `config`, splitting work into
    /// `chunk_size`-branch slices that rayon distributes one per hardware
    /// thread. Each worker processes its slice sequentially, checking the
    /// cancellation flag between branches so an in-flight cancel stops new
    /// work promptly without discarding results already computed.
    ///
    /// `on_progress` is called once per completed chunk, from whichever
    /// thread finishes that chunk; it must be `Sync` and should be cheap
    /// (e.g. pushing onto a channel) since it runs inside the worker pool.
    pub fn run_sweep(
        &self,
        branches: &[Branch],
        db: &PriceDB,
        config: &BatchConfig,
        chunk_size: Option<usize>,
        on_progress: impl Fn(SweepProgress) + Sync,
    ) -> Vec<BranchResult> {
        let total = branches.len();
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1);
        let db_fingerprint = cache::db_fingerprint(db);

        let done = AtomicUsize::new(0);
        let hits = AtomicUsize::new(0);
        let misses = AtomicUsize::new(0);

        branches
            .par_chunks(chunk_size)
            .flat_map(|chunk| {
                let mut results = Vec::with_capacity(chunk.len());
                for branch in chunk {
                    if self.is_cancelled() {
                        break;
                    }
                    let key = cache::cache_key(branch, &db_fingerprint, config);
                    let before = self.cache.len();
                    let outcome = self.cache.get_or_build(key, || {
                        backtest_engine::run(
                            &branch.tree,
                            db,
                            config.mode,
                            config.cost_bps,
                            config.benchmark_ticker.as_deref(),
                            config.split.as_ref(),
                        )
                        .map_err(|e| e.to_string())
                    });
                    let cache_hit = self.cache.len() == before;

                    if cache_hit {
                        hits.fetch_add(1, Ordering::Relaxed);
                    } else {
                        misses.fetch_add(1, Ordering::Relaxed);
                    }
                    results.push(BranchResult { branch_id: branch.id, outcome, cache_hit });
                }

                let done_so_far = done.fetch_add(results.len(), Ordering::Relaxed) + results.len();
                on_progress(SweepProgress {
                    done: done_so_far,
                    total,
                    hits: hits.load(Ordering::Relaxed),
                    misses: misses.load(Ordering::Relaxed),
                });

                results
            })
            .collect()
    }
}

impl Default for Sweep {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use analysis_core::Bar;
    use backtest_engine::BacktestMode;
    use branch_generator::{Branch, BranchParams};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use price_store::{build_db, PriceSeries};
    use strategy_tree::{Comparator, IndicatorKind, Node, Operand};

    use super::*;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + Duration::days(offset)
    }

    fn bar_at(offset: i64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.from_utc_datetime(&day(offset).and_hms_opt(0, 0, 0).unwrap()),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000_000.0,
            vwap: None,
        }
    }

    fn rising_series(ticker: &str, days: i64) -> PriceSeries {
        let bars = (0..days).map(|i| bar_at(i, 100.0 + i as f64)).collect();
        PriceSeries { ticker: ticker.to_string(), bars }
    }

    fn db_with(ticker: &str, days: i64) -> PriceDB {
        build_db(vec![rising_series(ticker, days)]).unwrap()
    }

    fn rsi_branch(ticker: &str, period: usize, threshold: f64) -> Branch {
        let gate = Node::Condition {
            left: Operand::Indicator { ticker: ticker.to_string(), kind: IndicatorKind::Rsi, period },
            comparator: Comparator::Gt,
            right: Operand::Constant(threshold),
            if_true: Node::position(ticker),
            if_false: Node::cash(),
        };
        Branch {
            id: Uuid::new_v4(),
            tree: Arc::new(gate),
            params: BranchParams {
                ticker: ticker.to_string(),
                period,
                comparator: Comparator::Gt,
                threshold,
                l2_period: None,
                l2_comparator: None,
                l2_threshold: None,
            },
        }
    }

    fn basic_config() -> BatchConfig {
        BatchConfig { mode: BacktestMode::CloseClose, cost_bps: 0.0, benchmark_ticker: None, split: None }
    }

    #[test]
    fn identical_branches_share_one_cache_entry() {
        let db = db_with("AAA", 60);
        let a = rsi_branch("AAA", 14, 50.0);
        let b = rsi_branch("AAA", 14, 50.0); // structurally identical tree, different id

        let sweep = Sweep::new();
        let results = sweep.run_sweep(&[a, b], &db, &basic_config(), None, |_| {});

        assert_eq!(results.len(), 2);
        assert_eq!(sweep.cache_len(), 1, "two structurally identical trees must collapse to one cache entry");
        let hit_count = results.iter().filter(|r| r.cache_hit).count();
        assert_eq!(hit_count, 1, "exactly one of the two identical branches should observe a cache hit");
    }

    #[test]
    fn distinct_branches_each_get_their_own_entry() {
        let db = db_with("AAA", 60);
        let branches: Vec<Branch> = (10..15).map(|p| rsi_branch("AAA", p, 50.0)).collect();

        let sweep = Sweep::new();
        let results = sweep.run_sweep(&branches, &db, &basic_config(), Some(2), |_| {});

        assert_eq!(results.len(), 5);
        assert_eq!(sweep.cache_len(), 5);
        assert!(results.iter().all(|r| !r.cache_hit));
    }

    #[test]
    fn a_failing_branch_does_not_abort_the_sweep() {
        let db = db_with("AAA", 10); // too few bars for a long RSI lookback
        let good = rsi_branch("AAA", 3, 50.0);
        let bad = rsi_branch("AAA", 200, 50.0); // lookback exceeds available calendar

        let sweep = Sweep::new();
        let results = sweep.run_sweep(&[good, bad], &db, &basic_config(), None, |_| {});

        assert_eq!(results.len(), 2);
        let failures = results.iter().filter(|r| r.outcome.is_err()).count();
        let successes = results.iter().filter(|r| r.outcome.is_ok()).count();
        assert_eq!(failures, 1);
        assert_eq!(successes, 1);
    }

    #[test]
    fn cancellation_stops_processing_new_branches() {
        let db = db_with("AAA", 60);
        let branches: Vec<Branch> = (10..30).map(|p| rsi_branch("AAA", p, 50.0)).collect();

        let sweep = Sweep::new();
        sweep.cancel();
        let results = sweep.run_sweep(&branches, &db, &basic_config(), Some(5), |_| {});

        assert!(results.len() < branches.len(), "a pre-cancelled sweep should not process every branch");
    }

    #[test]
    fn progress_callback_reaches_the_final_total() {
        let db = db_with("AAA", 60);
        let branches: Vec<Branch> = (10..16).map(|p| rsi_branch("AAA", p, 50.0)).collect();

        let sweep = Sweep::new();
        let last_done = Mutex::new(0usize);
        sweep.run_sweep(&branches, &db, &basic_config(), Some(3), |p| {
            let mut last = last_done.lock().unwrap();
            *last = (*last).max(p.done);
            assert_eq!(p.total, 6);
        });

        assert_eq!(*last_done.lock().unwrap(), 6);
    }
}
