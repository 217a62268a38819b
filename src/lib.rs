//! Caching Proxy - A forward HTTP proxy with an in-memory response cache
//!
//! Requests are handled by a bounded worker pool; cacheable GET/HEAD
//! responses are kept in an LRU store with lazy TTL expiration.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod proxy;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::ProxyError;
pub use pool::WorkerPool;
pub use proxy::ProxyPipeline;
