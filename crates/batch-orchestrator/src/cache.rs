use std::sync::Arc;

use backtest_engine::{BacktestMode, BacktestResult, SplitConfig};
use branch_generator::Branch;
use dashmap::DashMap;
use price_store::PriceDB;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The run-level settings every branch in one sweep shares. Bundled so the
/// cache key can include them without the caller threading four separate
/// arguments through every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    pub mode: BacktestMode,
    pub cost_bps: f64,
    pub benchmark_ticker: Option<String>,
    pub split: Option<SplitConfig>,
}

/// A cheap stand-in for hashing every bar in `db`: the ticker set and
/// calendar bounds are what actually change between sweeps against
/// different price windows, and re-serializing the whole series on every
/// cache lookup would dominate the cost the cache exists to avoid.
pub(crate) fn fingerprint_db(db: &PriceDB) -> String {
    let mut tickers: Vec<&str> = db.tickers().collect();
    tickers.sort_unstable();
    format!(
        "{}|{}|{}",
        tickers.join(","),
        db.calendar.first().map(|d| d.to_string()).unwrap_or_default(),
        db.calendar.last().map(|d| d.to_string()).unwrap_or_default(),
    )
}

/// Content address for one branch's run within a sweep: the branch's tree
/// shape plus the shared run config plus the price window, hex-encoded.
/// Two branches that happen to produce structurally identical trees (e.g.
/// the same gate reached through different sweep axes) collapse onto the
/// same key and are only ever run once.
pub fn cache_key(branch: &Branch, db_fingerprint: &str, config: &BatchConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(branch.tree.as_ref()).unwrap_or_default());
    hasher.update(db_fingerprint.as_bytes());
    hasher.update(serde_json::to_vec(config).unwrap_or_default());
    hex::encode(hasher.finalize())
}

pub(crate) use fingerprint_db as db_fingerprint;

/// At-most-one-build-per-key cache shared across a sweep's parallel branch
/// runs. Stores the fallible result (stringified error) rather than
/// `Result<_, BacktestError>` directly so it can be cloned out to every
/// caller that shares the key.
#[derive(Default)]
pub struct ResultCache {
    entries: DashMap<String, Arc<Result<BacktestResult, String>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached result for `key`, computing it with `build` if
    /// absent. `DashMap::entry` holds the shard lock for the duration of
    /// `or_insert_with`, so concurrent callers racing on the same key block
    /// on the first one rather than duplicating the work.
    pub fn get_or_build(&self, key: String, build: impl FnOnce() -> Result<BacktestResult, String>) -> Arc<Result<BacktestResult, String>> {
        self.entries.entry(key).or_insert_with(|| Arc::new(build())).clone()
    }
}
