use thiserror::Error;

#[derive(Error, Debug)]
pub enum PriceStoreError {
    #[error("price data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("ticker not found: {0}")]
    TickerMissing(String),

    #[error("ticker {0} has no data before its listing date for the requested range")]
    TickerInception(String),

    #[error("insufficient price history: {0}")]
    InsufficientData(String),
}
