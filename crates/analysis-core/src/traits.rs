use async_trait::async_trait;

use crate::{AnalysisError, Bar};

/// Boundary between the pure evaluation pipeline and whatever fetches bars.
///
/// Implemented by `polygon_client::PolygonClient` for production use and by
/// in-memory fixtures in tests, so `price-store` never has a direct
/// dependency on `reqwest`/`tokio`.
#[async_trait]
pub trait OhlcProvider: Send + Sync {
    async fn fetch_ohlc(&self, ticker: &str, max_bars: usize) -> Result<Vec<Bar>, AnalysisError>;
}
