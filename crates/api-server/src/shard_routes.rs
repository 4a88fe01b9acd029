use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use branch_generator::Branch;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shard_store::Shard;

use crate::response::{ApiResponse, AppError};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShardRequest {
    pub name: String,
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub oos_start_date: Option<NaiveDate>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardCreated {
    pub shard_id: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/shards", post(create_shard).get(list_shards))
        .route("/shards/:id", get(get_shard).delete(delete_shard))
}

async fn create_shard(
    State(state): State<AppState>,
    Json(req): Json<CreateShardRequest>,
) -> Result<Json<ApiResponse<ShardCreated>>, AppError> {
    let mut shard = Shard::new(req.name, req.branches);
    shard.metadata = req.metadata;
    shard.oos_start_date = req.oos_start_date;

    let shard_id = state.shard_store.save(&shard).await?;
    tracing::info!(shard_id, "shard persisted");
    Ok(Json(ApiResponse::success(ShardCreated { shard_id })))
}

async fn list_shards(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Shard>>>, AppError> {
    Ok(Json(ApiResponse::success(state.shard_store.list().await?)))
}

async fn get_shard(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<ApiResponse<Shard>>, AppError> {
    let shard = state.shard_store.get(id).await?.ok_or_else(|| anyhow::anyhow!("shard not found: {id}"))?;
    Ok(Json(ApiResponse::success(shard)))
}

async fn delete_shard(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    state.shard_store.delete(id).await?;
    tracing::info!(id, "shard deleted");
    Ok(Json(ApiResponse::success("deleted")))
}
