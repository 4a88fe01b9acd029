use std::collections::HashMap;

use analysis_core::Bar;
use chrono::NaiveDate;

use crate::error::PriceStoreError;

/// Daily OHLCV history for one ticker, ascending by date.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub ticker: String,
    pub bars: Vec<Bar>,
}

/// A calendar-aligned collection of price series for every ticker a
/// strategy tree references. `calendar` is the union of trading days
/// observed across all series; `inception_index[ticker]` is the index into
/// `calendar` of that ticker's first available bar, so the evaluator can
/// tell whether a ticker existed yet on a given day without re-scanning
/// its series.
#[derive(Debug, Clone)]
pub struct PriceDB {
    pub calendar: Vec<NaiveDate>,
    series: HashMap<String, PriceSeries>,
    date_index: HashMap<String, HashMap<NaiveDate, usize>>,
    pub inception_index: HashMap<String, usize>,
}

impl PriceDB {
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|s| s.as_str())
    }

    pub fn bars(&self, ticker: &str) -> Option<&[Bar]> {
        self.series.get(ticker).map(|s| s.bars.as_slice())
    }

    /// Index of `date` within `ticker`'s own bar vector, if that ticker
    /// traded on that day.
    pub fn bar_index_on(&self, ticker: &str, date: NaiveDate) -> Option<usize> {
        self.date_index.get(ticker).and_then(|m| m.get(&date)).copied()
    }

    /// True once `ticker` has traded as of `date` (on or after its
    /// inception, not necessarily on `date` itself — use `bar_index_on`
    /// for exact-day lookups).
    pub fn has_inception_by(&self, ticker: &str, calendar_idx: usize) -> bool {
        self.inception_index.get(ticker).map(|i| *i <= calendar_idx).unwrap_or(false)
    }

    /// The most recent `len` closes for `ticker` ending at (and including)
    /// `date`, oldest first. `None` if the ticker hasn't traded by `date`
    /// or doesn't have `len` bars of history yet.
    pub fn closes_window(&self, ticker: &str, date: NaiveDate, len: usize) -> Option<Vec<f64>> {
        let idx = self.bar_index_on(ticker, date)?;
        let bars = self.bars(ticker)?;
        if idx + 1 < len {
            return None;
        }
        Some(bars[idx + 1 - len..=idx].iter().map(|b| b.close).collect())
    }

    /// The most recent `len` bars for `ticker` ending at `date`.
    pub fn bars_window(&self, ticker: &str, date: NaiveDate, len: usize) -> Option<&[Bar]> {
        let idx = self.bar_index_on(ticker, date)?;
        let bars = self.bars(ticker)?;
        if idx + 1 < len {
            return None;
        }
        Some(&bars[idx + 1 - len..=idx])
    }

    /// The ticker whose first trading day is latest — the one that
    /// constrains how far back a multi-ticker strategy can be backtested.
    pub fn limiting_ticker(&self) -> Option<&str> {
        self.inception_index
            .iter()
            .max_by_key(|(_, idx)| **idx)
            .map(|(ticker, _)| ticker.as_str())
    }
}

/// Build a `PriceDB` from already-fetched series, deriving the union
/// calendar and each ticker's inception index.
pub fn build_db(series: Vec<PriceSeries>) -> Result<PriceDB, PriceStoreError> {
    if series.is_empty() {
        return Err(PriceStoreError::InsufficientData("no series provided".into()));
    }

    let mut calendar_set: Vec<NaiveDate> = Vec::new();
    for s in &series {
        if s.bars.is_empty() {
            return Err(PriceStoreError::InsufficientData(format!("{} has no bars", s.ticker)));
        }
        for bar in &s.bars {
            calendar_set.push(bar.timestamp.date_naive());
        }
    }
    calendar_set.sort_unstable();
    calendar_set.dedup();

    let mut date_index = HashMap::new();
    let mut inception_index = HashMap::new();
    let mut by_ticker = HashMap::new();

    for s in series {
        let first_date = s.bars[0].timestamp.date_naive();
        let inception = calendar_set.binary_search(&first_date).map_err(|_| {
            PriceStoreError::InsufficientData(format!("inception date for {} missing from calendar", s.ticker))
        })?;
        inception_index.insert(s.ticker.clone(), inception);

        let mut per_date = HashMap::with_capacity(s.bars.len());
        for (i, bar) in s.bars.iter().enumerate() {
            per_date.insert(bar.timestamp.date_naive(), i);
        }
        date_index.insert(s.ticker.clone(), per_date);
        by_ticker.insert(s.ticker.clone(), s);
    }

    Ok(PriceDB {
        calendar: calendar_set,
        series: by_ticker,
        date_index,
        inception_index,
    })
}
