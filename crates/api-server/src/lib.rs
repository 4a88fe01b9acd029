//! Narrow HTTP ingress over the evaluation core: single-shot backtests,
//! sweeps, and shard persistence. Everything else a strategy platform needs
//! (auth, watchlists, broker execution, charting) lives outside this
//! surface — this crate only wires the core's own entry points to JSON.

pub mod backtest_routes;
pub mod response;
pub mod shard_routes;
pub mod sweep_routes;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use dashmap::DashMap;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use response::{ApiResponse, AppError};

use batch_orchestrator::{BranchResult, Sweep, SweepProgress};
use price_store::PriceDB;
use shard_store::ShardStore;

/// One in-flight or completed sweep, keyed by the id handed back from
/// `POST /sweep`. Kept in memory only — a sweep's branch results belong in
/// a shard (via `POST /shards`) if the caller wants them to outlive the
/// process.
pub struct SweepHandle {
    pub runner: Arc<Sweep>,
    pub progress: Arc<Mutex<SweepProgress>>,
    pub results: Arc<Mutex<Option<Vec<BranchResult>>>>,
}

/// Shared state every route handler sees. `price_db` is the calendar-aligned
/// bar store the core evaluates against; it's loaded once at startup from
/// whichever tickers the deployment is configured to track and is read-only
/// from then on, per the core's shared-resource policy.
#[derive(Clone)]
pub struct AppState {
    pub price_db: Arc<PriceDB>,
    pub shard_store: Arc<ShardStore>,
    pub sweeps: Arc<DashMap<Uuid, SweepHandle>>,
}

/// Runtime configuration, read once at startup from the environment (via
/// `.env` if present). Mirrors the core's own `backtest.*`/`split.*`/
/// `sweep.*` configuration surface (spec.md §6) rather than inventing a
/// parallel naming scheme.
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub tickers: Vec<String>,
    pub max_bars: usize,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = std::env::var("API_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let database_url =
            std::env::var("SHARD_DATABASE_URL").unwrap_or_else(|_| "sqlite://shards.db".to_string());

        let tickers: Vec<String> = std::env::var("CORE_TICKERS")
            .unwrap_or_else(|_| "SPY,QQQ".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_bars: usize =
            std::env::var("CORE_MAX_BARS").ok().and_then(|v| v.parse().ok()).unwrap_or(2520);

        Ok(Self { bind_addr: SocketAddr::from(([0, 0, 0, 0], port)), database_url, tickers, max_bars })
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .merge(backtest_routes::routes())
        .merge(sweep_routes::routes())
        .merge(shard_routes::routes())
        .route("/health", axum::routing::get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Loads price data through whichever `OhlcProvider` the deployment is
/// configured with, opens the shard database, and serves the ingress routes
/// until the process is signalled to stop.
pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "api_server=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let api_key = std::env::var("POLYGON_API_KEY").map_err(|_| anyhow::anyhow!("POLYGON_API_KEY must be set"))?;
    let provider = polygon_client::PolygonClient::new(api_key);

    tracing::info!("loading {} tickers ({} max bars each)", config.tickers.len(), config.max_bars);
    let price_db = price_store::load(&provider, &config.tickers, config.max_bars).await?;

    let pool = SqlitePool::connect(&config.database_url).await?;
    let shard_store = ShardStore::new(pool);
    shard_store.init_tables().await?;

    let state = AppState {
        price_db: Arc::new(price_db),
        shard_store: Arc::new(shard_store),
        sweeps: Arc::new(DashMap::new()),
    };

    tracing::info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
