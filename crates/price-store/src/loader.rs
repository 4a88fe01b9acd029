use analysis_core::{AnalysisError, OhlcProvider};

use crate::error::PriceStoreError;
use crate::model::{build_db, PriceDB, PriceSeries};

/// Fetch bars for every ticker from `provider` and assemble a `PriceDB`.
/// Tickers are fetched sequentially — the provider itself (e.g.
/// `polygon_client::PolygonClient`) owns any request-level concurrency and
/// rate limiting.
pub async fn load(provider: &dyn OhlcProvider, tickers: &[String], max_bars: usize) -> Result<PriceDB, PriceStoreError> {
    let mut series = Vec::with_capacity(tickers.len());

    for ticker in tickers {
        let bars = provider.fetch_ohlc(ticker, max_bars).await.map_err(|e| match e {
            AnalysisError::InvalidData(msg) => PriceStoreError::TickerMissing(msg),
            other => PriceStoreError::SourceUnavailable(other.to_string()),
        })?;

        if bars.is_empty() {
            return Err(PriceStoreError::TickerMissing(ticker.clone()));
        }

        series.push(PriceSeries { ticker: ticker.clone(), bars });
    }

    build_db(series)
}
