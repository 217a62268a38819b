//! Response models for the proxy's admin endpoints
//!
//! Proxied traffic is passed through untouched; only the `/_proxy/*` routes
//! produce bodies of their own.

pub mod responses;

pub use responses::{HealthResponse, StatsResponse};
