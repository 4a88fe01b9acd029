use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strategy_tree::Comparator;
use uuid::Uuid;

/// The concrete parameter values a branch's tree was instantiated from —
/// kept alongside the tree so a shard can re-derive a pattern signature or
/// display a human-readable label without re-walking the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchParams {
    pub ticker: String,
    pub period: usize,
    pub comparator: Comparator,
    pub threshold: f64,
    pub l2_period: Option<usize>,
    pub l2_comparator: Option<Comparator>,
    pub l2_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: Uuid,
    pub tree: Arc<strategy_tree::Node>,
    pub params: BranchParams,
}
