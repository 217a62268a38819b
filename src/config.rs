//! Configuration Module
//!
//! Handles loading and managing proxy configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;

/// Rejected configuration values.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid port number: {0}")]
    InvalidPort(u16),
    #[error("invalid proxy timeout: {0}")]
    InvalidProxyTimeout(u64),
    #[error("invalid max connections: {0}")]
    InvalidMaxConnections(usize),
}

/// Proxy configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. The config is read once at start-up and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind
    pub host: String,
    /// HTTP server port
    pub server_port: u16,
    /// Maximum number of cached responses
    pub cache_capacity: usize,
    /// Fallback TTL in seconds when upstream sends no caching headers, 0 = never expire
    pub default_ttl: u64,
    /// Upstream fetch timeout in seconds
    pub proxy_timeout: u64,
    /// Host suffixes allowed as targets, empty = all hosts
    pub allowed_domains: Vec<String>,
    /// Number of pipeline workers
    pub max_connections: usize,
    /// Match allowed domains on label boundaries instead of plain suffixes
    pub strict_domain_matching: bool,
    /// Requests per client IP per minute, 0 = `max_connections * 60`
    pub rate_limit_per_minute: u64,
    /// Largest inbound request body accepted, in bytes
    pub max_body_size: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_HOST` - Bind address (default: 127.0.0.1)
    /// - `SERVER_PORT` - HTTP server port (default: 8080)
    /// - `CACHE_CAPACITY` - Maximum cached responses (default: 1024)
    /// - `DEFAULT_TTL` - Fallback TTL in seconds (default: 3600)
    /// - `PROXY_TIMEOUT` - Upstream timeout in seconds (default: 30)
    /// - `MAX_CONNECTIONS` - Worker pool size (default: 100)
    /// - `ALLOWED_DOMAINS` - Comma-separated domain suffixes (default: none)
    /// - `STRICT_DOMAIN_MATCHING` - `true` for label-boundary matching (default: false)
    /// - `RATE_LIMIT_PER_MINUTE` - Requests per client IP per minute (default: 0, derived)
    /// - `MAX_BODY_SIZE` - Request body limit in bytes (default: 10 MiB)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("SERVER_HOST").unwrap_or(defaults.host),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache_capacity: env_or("CACHE_CAPACITY", defaults.cache_capacity),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            proxy_timeout: env_or("PROXY_TIMEOUT", defaults.proxy_timeout),
            allowed_domains: env::var("ALLOWED_DOMAINS")
                .map(|v| parse_domain_list(&v))
                .unwrap_or(defaults.allowed_domains),
            max_connections: env_or("MAX_CONNECTIONS", defaults.max_connections),
            strict_domain_matching: env_or(
                "STRICT_DOMAIN_MATCHING",
                defaults.strict_domain_matching,
            ),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            max_body_size: env_or("MAX_BODY_SIZE", defaults.max_body_size),
        }
    }

    /// Checks the values that would make the proxy unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_port == 0 {
            return Err(ConfigError::InvalidPort(self.server_port));
        }
        if self.proxy_timeout == 0 {
            return Err(ConfigError::InvalidProxyTimeout(self.proxy_timeout));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(self.max_connections));
        }
        Ok(())
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_timeout)
    }

    /// Per-client request budget for each one-minute window.
    pub fn requests_per_minute(&self) -> u64 {
        match self.rate_limit_per_minute {
            0 => (self.max_connections as u64).saturating_mul(60),
            limit => limit,
        }
    }

    /// TTL applied when the upstream response carries no usable caching headers.
    pub fn default_ttl(&self) -> Option<TimeDelta> {
        match self.default_ttl {
            0 => None,
            secs => i64::try_from(secs).ok().and_then(TimeDelta::try_seconds),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            server_port: 8080,
            cache_capacity: 1024,
            default_ttl: 3600,
            proxy_timeout: 30,
            allowed_domains: Vec::new(),
            max_connections: 100,
            strict_domain_matching: false,
            rate_limit_per_minute: 0,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Splits a comma-separated domain list, trimming entries and dropping empties.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}
