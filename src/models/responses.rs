//! Response DTOs for the admin endpoints

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for `GET /_proxy/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Current number of cached responses
    pub size: usize,
    /// Maximum number of cached responses
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// hits / (hits + misses), 0 before the first lookup
    pub hit_rate: f64,
    /// Mean encoded size of the cached responses in bytes
    pub avg_item_size: usize,
    /// Pipeline workers in the pool
    pub workers: usize,
}

impl StatsResponse {
    /// Creates a new StatsResponse from a cache snapshot
    pub fn new(stats: &CacheStats, workers: usize) -> Self {
        Self {
            size: stats.size,
            capacity: stats.capacity,
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            hit_rate: stats.hit_rate(),
            avg_item_size: stats.avg_item_size,
            workers,
        }
    }
}

/// Response body for `GET /_proxy/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
