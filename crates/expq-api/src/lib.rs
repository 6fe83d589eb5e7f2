//! EXPQ API /v1: REST endpoints
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;

pub use config::{Config, ConfigError};
pub use metrics::{Metrics, RequestCounters};

use axum::{
    routing::{get, post},
    Router,
};
use expq_exec::{MemoryStore, StoreError};
use expq_stages::{Dispatcher, PipelineConfig, QueryPipeline, RateLimiter};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("SERVE/io: {0}")]
    Io(#[from] std::io::Error),
}

/// Process-wide components, created once at startup
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<MemoryStore>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn from_config(config: Config) -> Result<Self, ServeError> {
        let store = match &config.seed_path {
            Some(path) => MemoryStore::load(path)?,
            None => MemoryStore::new(),
        };
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn with_store(config: Config, store: Arc<MemoryStore>) -> Self {
        let limiter = Arc::new(RateLimiter::per_minute(config.llm_requests_per_minute));
        let pipeline = QueryPipeline::new(store.clone())
            .with_rate_limiter(limiter)
            .with_config(PipelineConfig {
                max_input_chars: config.max_input_chars,
                llm_timeout: config.llm_timeout(),
                ..PipelineConfig::default()
            });

        Self {
            dispatcher: Arc::new(Dispatcher::new(Arc::new(pipeline))),
            store,
            metrics: Arc::new(Metrics::new()),
            config: Arc::new(config),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/process", post(handlers::process))
        .route("/v1/query", post(handlers::query))
        .route("/v1/health", get(handlers::health))
        .route("/v1/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn(middleware::trace_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), ServeError> {
    let addr = config.addr.clone();
    let state = AppState::from_config(config)?;
    tracing::info!(records = state.store.len(), "expense store ready");

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("EXPQ API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
