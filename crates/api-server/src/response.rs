use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use backtest_engine::BacktestError;
use price_store::PriceStoreError;
use serde::Serialize;
use shard_store::ShardStoreError;
use strategy_tree::TreeError;

/// Uniform success envelope for every route in this crate.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data }
    }
}

/// The fatal-error taxonomy every route maps onto, mirroring the crate's
/// own error enums (`TreeError`, `PriceStoreError`, `BacktestError`,
/// `ShardStoreError`) rather than inventing a parallel one at the ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    ValidationError,
    EmptyStrategy,
    CallCycle,
    SourceUnavailable,
    InsufficientData,
    TickerMissing,
    NotFound,
    Internal,
}

impl ErrorKind {
    fn status(self) -> StatusCode {
        match self {
            ErrorKind::ValidationError | ErrorKind::EmptyStrategy | ErrorKind::CallCycle => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::SourceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::InsufficientData => StatusCode::CONFLICT,
            ErrorKind::TickerMissing | ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The JSON body every failed request gets, per spec's
/// `{ kind, message, nodeId?, field? }` error contract.
#[derive(Serialize)]
pub struct AppError {
    #[serde(skip)]
    status: StatusCode,
    success: bool,
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
}

impl AppError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { status: kind.status(), success: false, kind, message: message.into(), node_id: None }
    }

    /// Requests that fail for reasons this crate didn't anticipate (JSON
    /// body parse failures, missing env config, sqlx/io errors) map to
    /// `Internal` rather than panicking the handler.
    fn internal(message: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::Internal, message.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        tracing::warn!(kind = ?self.kind, "request failed: {}", self.message);
        (status, Json(self)).into_response()
    }
}

impl From<TreeError> for AppError {
    fn from(err: TreeError) -> Self {
        match &err {
            TreeError::EmptyStrategy => Self::new(ErrorKind::EmptyStrategy, err.to_string()),
            TreeError::CallCycle(_) => Self::new(ErrorKind::CallCycle, err.to_string()),
            TreeError::UnknownCall(_) => Self::new(ErrorKind::ValidationError, err.to_string()),
        }
    }
}

impl From<PriceStoreError> for AppError {
    fn from(err: PriceStoreError) -> Self {
        match &err {
            PriceStoreError::SourceUnavailable(_) => Self::new(ErrorKind::SourceUnavailable, err.to_string()),
            PriceStoreError::TickerMissing(_) => Self::new(ErrorKind::TickerMissing, err.to_string()),
            PriceStoreError::TickerInception(_) | PriceStoreError::InsufficientData(_) => {
                Self::new(ErrorKind::InsufficientData, err.to_string())
            }
        }
    }
}

impl From<BacktestError> for AppError {
    fn from(err: BacktestError) -> Self {
        match &err {
            BacktestError::InsufficientData(_) => Self::new(ErrorKind::InsufficientData, err.to_string()),
            BacktestError::TickerMissing(_) => Self::new(ErrorKind::TickerMissing, err.to_string()),
            BacktestError::Validation(_) => Self::new(ErrorKind::ValidationError, err.to_string()),
        }
    }
}

impl From<ShardStoreError> for AppError {
    fn from(err: ShardStoreError) -> Self {
        match &err {
            ShardStoreError::NotFound(_) => Self::new(ErrorKind::NotFound, err.to_string()),
            ShardStoreError::Database(_) | ShardStoreError::Serialization(_) => Self::internal(err),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if err.to_string().to_lowercase().contains("not found") {
            Self::new(ErrorKind::NotFound, err.to_string())
        } else {
            Self::internal(err)
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        Self::new(ErrorKind::ValidationError, err.to_string())
    }
}
