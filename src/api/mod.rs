//! API Module
//!
//! HTTP handlers and routing for the proxy.
//!
//! # Endpoints
//! - `GET /_proxy/health` - Health check endpoint
//! - `GET /_proxy/stats` - Cache and pool statistics
//! - anything else - proxied through the worker pool

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
