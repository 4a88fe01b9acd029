use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("ticker missing from price store: {0}")]
    TickerMissing(String),
}
