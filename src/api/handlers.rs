//! API Handlers
//!
//! The proxy dispatcher and the admin endpoints.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    response::Response,
    Json,
};
use tracing::info;

use super::middleware::RateLimiter;
use crate::cache::{shared, CacheStore, SharedCache};
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::models::{HealthResponse, StatsResponse};
use crate::pool::{HandlerFuture, JobHandler, PoolError, WorkerPool};
use crate::proxy::ProxyPipeline;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cache shared by every worker
    pub cache: SharedCache,
    pub pool: Arc<WorkerPool>,
    /// Per-client request budget
    pub limiter: Arc<RateLimiter>,
    /// Largest inbound body accepted, in bytes
    pub max_body_size: usize,
    /// Pipeline entry point handed to the pool with each job
    handler: JobHandler,
}

impl AppState {
    /// Wires a pipeline and a pool around an existing cache.
    pub fn new(
        cache: SharedCache,
        pipeline: ProxyPipeline,
        pool: WorkerPool,
        limiter: RateLimiter,
        max_body_size: usize,
    ) -> Self {
        let pipeline = Arc::new(pipeline);
        let handler: JobHandler = Arc::new(move |request: Request| -> HandlerFuture {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move { pipeline.handle(request).await })
        });

        Self {
            cache,
            pool: Arc::new(pool),
            limiter: Arc::new(limiter),
            max_body_size,
            handler,
        }
    }

    /// Creates the cache, pipeline and worker pool from configuration.
    ///
    /// Spawns the workers, so it must run inside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = shared(CacheStore::new(config.cache_capacity));
        let pipeline = ProxyPipeline::new(cache.clone(), config)?;
        let pool = WorkerPool::new(config.max_connections);
        let limiter = RateLimiter::per_minute(config.requests_per_minute());

        info!(
            "Proxy state ready: cache_capacity={}, workers={}, rate_limit={}/min",
            config.cache_capacity,
            pool.size(),
            limiter.limit()
        );

        Ok(Self::new(cache, pipeline, pool, limiter, config.max_body_size))
    }
}

/// Fallback for every non-admin request
///
/// Hands the request to the worker pool and waits for the pipeline's answer.
pub async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Result<Response> {
    state
        .pool
        .enqueue(request, Arc::clone(&state.handler))
        .await
        .map_err(|e| match e {
            PoolError::Stopped => ProxyError::PoolStopped,
            PoolError::Dropped => ProxyError::WorkerFailed,
        })
}

/// Handler for GET /_proxy/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.read().await.stats();
    Json(StatsResponse::new(&stats, state.pool.size()))
}

/// Handler for GET /_proxy/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode};

    fn test_state() -> AppState {
        let config = Config {
            max_connections: 2,
            ..Config::default()
        };
        AppState::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_runs_pipeline_on_pool() {
        let state = test_state();
        let request = Request::builder()
            .uri("/no/target")
            .body(Body::empty())
            .unwrap();

        let response = dispatch_handler(State(state.clone()), request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        state.pool.stop().await;
    }

    #[tokio::test]
    async fn test_dispatch_after_stop_is_unavailable() {
        let state = test_state();
        state.pool.stop().await;

        let request = Request::builder()
            .uri("/?url=http://example.com/")
            .body(Body::empty())
            .unwrap();
        let result = dispatch_handler(State(state), request).await;

        assert!(matches!(result, Err(ProxyError::PoolStopped)));
    }

    #[tokio::test]
    async fn test_stats_handler_reports_workers() {
        let state = test_state();
        state.cache.write().await.set("GET:http://a.test/", "x", None);
        state.cache.write().await.get("GET:http://a.test/");
        state.cache.write().await.get("GET:http://b.test/");

        let Json(stats) = stats_handler(State(state.clone())).await;

        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.workers, 2);
        state.pool.stop().await;
    }

    #[tokio::test]
    async fn test_health_handler() {
        let Json(health) = health_handler().await;
        assert_eq!(health.status, "healthy");
    }
}
