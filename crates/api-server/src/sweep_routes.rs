use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use batch_orchestrator::{BatchConfig, BranchResult, Sweep, SweepProgress};
use branch_generator::BranchConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::response::{ApiResponse, AppError};
use crate::{AppState, SweepHandle};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    pub branch_gen_config: BranchConfig,
    #[serde(flatten)]
    pub run_config: BatchConfig,
    pub chunk_size: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepStarted {
    pub sweep_id: Uuid,
    pub branch_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepStatus {
    pub progress: SweepProgress,
    pub complete: bool,
    pub results: Option<Vec<BranchResult>>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sweep", post(start_sweep))
        .route("/sweep/:id/cancel", post(cancel_sweep))
        .route("/sweep/:id/status", get(sweep_status))
}

/// Generates the branch set and hands it to a dedicated blocking thread —
/// sweep evaluation is CPU-bound and must not run on the async reactor, per
/// the core's own no-suspension-points rule for cross-branch parallelism.
/// The handler returns as soon as the sweep id is registered; callers poll
/// `GET /sweep/{id}/status` for progress and, once complete, results.
async fn start_sweep(
    State(state): State<AppState>,
    Json(req): Json<SweepRequest>,
) -> Result<Json<ApiResponse<SweepStarted>>, AppError> {
    let branches = branch_generator::generate(&req.branch_gen_config);
    let branch_count = branches.len();
    let sweep_id = Uuid::new_v4();

    let runner = Arc::new(Sweep::new());
    let progress = Arc::new(Mutex::new(SweepProgress { done: 0, total: branch_count, hits: 0, misses: 0 }));
    let results = Arc::new(Mutex::new(None));

    state
        .sweeps
        .insert(sweep_id, SweepHandle { runner: runner.clone(), progress: progress.clone(), results: results.clone() });

    tracing::info!(%sweep_id, branch_count, "starting sweep");

    let db = state.price_db.clone();
    let progress_for_task = progress.clone();
    tokio::task::spawn_blocking(move || {
        let outcome = runner.run_sweep(&branches, &db, &req.run_config, req.chunk_size, |p| {
            *progress_for_task.lock().unwrap() = p;
        });
        *results.lock().unwrap() = Some(outcome);
    });

    Ok(Json(ApiResponse::success(SweepStarted { sweep_id, branch_count })))
}

async fn cancel_sweep(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    let handle = state.sweeps.get(&id).ok_or_else(|| anyhow::anyhow!("sweep not found: {id}"))?;
    handle.runner.cancel();
    tracing::info!(%id, "sweep cancel requested");
    Ok(Json(ApiResponse::success("cancelling")))
}

async fn sweep_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ApiResponse<SweepStatus>>, AppError> {
    let handle = state.sweeps.get(&id).ok_or_else(|| anyhow::anyhow!("sweep not found: {id}"))?;
    let progress = *handle.progress.lock().unwrap();
    let results = handle.results.lock().unwrap().clone();
    let complete = results.is_some();
    Ok(Json(ApiResponse::success(SweepStatus { progress, complete, results })))
}
