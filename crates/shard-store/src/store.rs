use branch_generator::Branch;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::ShardStoreError;

/// A persisted composite strategy: the branches selected by one filter/
/// rank/select pass, kept alongside the name and metadata the caller
/// attached and the out-of-sample start date (if the sweep that produced
/// them used a split), so downstream IS/OOS metrics stay meaningful after
/// the shard is reloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shard {
    pub id: Option<i64>,
    pub name: String,
    pub branches: Vec<Branch>,
    pub metadata: serde_json::Value,
    pub oos_start_date: Option<NaiveDate>,
    pub created_at: Option<String>,
}

impl Shard {
    pub fn new(name: impl Into<String>, branches: Vec<Branch>) -> Self {
        Self {
            id: None,
            name: name.into(),
            branches,
            metadata: serde_json::Value::Null,
            oos_start_date: None,
            created_at: None,
        }
    }
}

/// Append-only shard persistence. Mirrors the donor's `BacktestDb`: a
/// pool wrapper, JSON-blob columns for the nested structures, explicit
/// `INSERT ... RETURNING id`.
pub struct ShardStore {
    pool: SqlitePool,
}

impl ShardStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_tables(&self) -> Result<(), ShardStoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS shards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                branches_json TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                oos_start_date TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persists `shard`, ignoring any `id` it already carries, and returns
    /// the id the row was assigned.
    pub async fn save(&self, shard: &Shard) -> Result<i64, ShardStoreError> {
        self.init_tables().await?;

        let branches_json = serde_json::to_string(&shard.branches)?;
        let metadata_json = serde_json::to_string(&shard.metadata)?;
        let oos = shard.oos_start_date.map(|d| d.to_string());

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO shards (name, branches_json, metadata_json, oos_start_date)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&shard.name)
        .bind(&branches_json)
        .bind(&metadata_json)
        .bind(&oos)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Shard>, ShardStoreError> {
        self.init_tables().await?;

        let row = sqlx::query_as::<_, ShardRow>(
            "SELECT id, name, branches_json, metadata_json, oos_start_date, created_at
             FROM shards WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_shard()).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Shard>, ShardStoreError> {
        self.init_tables().await?;

        let rows = sqlx::query_as::<_, ShardRow>(
            "SELECT id, name, branches_json, metadata_json, oos_start_date, created_at
             FROM shards ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_shard()).collect()
    }

    pub async fn delete(&self, id: i64) -> Result<(), ShardStoreError> {
        let result = sqlx::query("DELETE FROM shards WHERE id = ?").bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(ShardStoreError::NotFound(id));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ShardRow {
    id: i64,
    name: String,
    branches_json: String,
    metadata_json: String,
    oos_start_date: Option<String>,
    created_at: Option<String>,
}

impl ShardRow {
    fn into_shard(self) -> Result<Shard, ShardStoreError> {
        Ok(Shard {
            id: Some(self.id),
            name: self.name,
            branches: serde_json::from_str(&self.branches_json)?,
            metadata: serde_json::from_str(&self.metadata_json)?,
            oos_start_date: self.oos_start_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use strategy_tree::{Comparator, Node};

    use super::*;
    use branch_generator::BranchParams;
    use uuid::Uuid;

    fn sample_branch(ticker: &str) -> Branch {
        Branch {
            id: Uuid::new_v4(),
            tree: Node::position(ticker),
            params: BranchParams {
                ticker: ticker.to_string(),
                period: 14,
                comparator: Comparator::Gt,
                threshold: 50.0,
                l2_period: None,
                l2_comparator: None,
                l2_threshold: None,
            },
        }
    }

    async fn memory_store() -> ShardStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        ShardStore::new(pool)
    }

    #[tokio::test]
    async fn saving_and_fetching_a_shard_round_trips_its_branches() {
        let store = memory_store().await;
        let mut shard = Shard::new("momentum-v1", vec![sample_branch("AAPL"), sample_branch("MSFT")]);
        shard.oos_start_date = Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        let id = store.save(&shard).await.unwrap();
        let fetched = store.get(id).await.unwrap().expect("shard should exist");

        assert_eq!(fetched.name, "momentum-v1");
        assert_eq!(fetched.branches.len(), 2);
        assert_eq!(fetched.oos_start_date, shard.oos_start_date);
    }

    #[tokio::test]
    async fn deleting_an_unknown_shard_is_an_error() {
        let store = memory_store().await;
        store.init_tables().await.unwrap();
        let result = store.delete(999).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_returns_every_saved_shard() {
        let store = memory_store().await;
        store.save(&Shard::new("a", vec![sample_branch("AAPL")])).await.unwrap();
        store.save(&Shard::new("b", vec![sample_branch("MSFT")])).await.unwrap();

        let shards = store.list().await.unwrap();
        assert_eq!(shards.len(), 2);
    }
}
