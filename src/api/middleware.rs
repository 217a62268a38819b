//! Request Decorators
//!
//! Per-client rate limiting and sequential request IDs. Compression, security
//! headers, body limits, CORS and tracing are tower-http layers wired in
//! `routes.rs`.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{self, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::warn;

use crate::error::ProxyError;

const WINDOW: Duration = Duration::from_secs(60);

/// Tracked clients above which idle windows are dropped
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    started: Instant,
    count: u64,
}

// == Rate Limiter ==
/// Fixed-window request counter keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u64,
    window: Duration,
    clients: DashMap<IpAddr, ClientWindow>,
}

impl RateLimiter {
    /// Allows `limit` requests per client per minute.
    pub fn per_minute(limit: u64) -> Self {
        Self::with_window(limit, WINDOW)
    }

    pub fn with_window(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: DashMap::new(),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Counts one request from `ip`; false once the client is over budget
    /// for its current window.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        if self.clients.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }

        let mut window = self.clients.entry(ip).or_insert(ClientWindow {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            *window = ClientWindow {
                started: now,
                count: 0,
            };
        }
        window.count += 1;
        window.count <= self.limit
    }

    fn prune(&self, now: Instant) {
        self.clients
            .retain(|_, window| now.duration_since(window.started) < self.window);
    }
}

/// Rejects clients that went over their budget with 429.
///
/// Requests without a known peer address are not limited.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = client {
        if !limiter.check(ip) {
            warn!("Rate limit exceeded for {}", ip);
            return ProxyError::RateLimited.into_response();
        }
    }

    next.run(request).await
}

// == Request IDs ==
/// Numbers requests 1, 2, 3... for the `X-Request-ID` header.
#[derive(Debug, Clone, Default)]
pub struct SequentialRequestId {
    issued: Arc<AtomicU64>,
}

impl MakeRequestId for SequentialRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        Some(RequestId::new(HeaderValue::from(id)))
    }
}
