//! Proxy Module
//!
//! The request pipeline run by the worker pool, together with the policy
//! checks, TTL rules and cache wire format it relies on.

pub mod pipeline;
pub mod policy;
pub mod ttl;
pub mod wire;

pub use pipeline::{ProxyPipeline, MAX_REDIRECTS, PROXY_SERVER_ID};
pub use policy::{
    cache_key, is_request_cacheable, is_response_cacheable, resolve_target, target_host,
    DomainFilter,
};
pub use ttl::{derive_ttl, parse_http_date};
pub use wire::{CachedResponse, WireError};
