use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("shard not found: {0}")]
    NotFound(i64),
}
