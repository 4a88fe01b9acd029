use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use backtest_engine::{BacktestMode, BacktestResult, SplitConfig};
use serde::Deserialize;
use strategy_tree::StrategyTree;

use crate::response::{ApiResponse, AppError};
use crate::AppState;

/// Single-shot backtest request. `mode`/`split` use the core's own
/// `camelCase` variant names (`closeClose`, `chronological`, ...) rather
/// than the two-letter shorthand sketched in the wire contract — the full
/// names are self-documenting and the core's own `BacktestResult` payload
/// already has to be read to make sense of the response, so terseness on
/// the request buys nothing.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunBacktestRequest {
    pub payload: StrategyTree,
    pub mode: BacktestMode,
    pub cost_bps: f64,
    pub benchmark_ticker: Option<String>,
    pub split_config: Option<SplitConfig>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/backtest", post(run_backtest))
}

async fn run_backtest(
    State(state): State<AppState>,
    Json(req): Json<RunBacktestRequest>,
) -> Result<Json<ApiResponse<BacktestResult>>, AppError> {
    tracing::info!(mode = ?req.mode, cost_bps = req.cost_bps, "running backtest");

    req.payload.ensure_slots()?;
    req.payload.validate_non_empty()?;
    let tree = req.payload.expand_calls()?;

    let result = backtest_engine::run(
        &tree,
        &state.price_db,
        req.mode,
        req.cost_bps,
        req.benchmark_ticker.as_deref(),
        req.split_config.as_ref(),
    )?;

    tracing::info!(
        total_return = result.metrics.total_return,
        sharpe = result.metrics.sharpe,
        "backtest complete"
    );

    Ok(Json(ApiResponse::success(result)))
}
