//! API Routes
//!
//! Configures the Axum router: admin endpoints under `/_proxy`, everything
//! else falls through to the proxy dispatcher.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::{DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;

use super::handlers::{dispatch_handler, health_handler, stats_handler, AppState};
use super::middleware::{rate_limit, SequentialRequestId};

const SECURITY_HEADERS: [(header::HeaderName, &str); 4] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
];

/// Creates the main router.
///
/// Absolute-form proxy requests are routed on their path, so a target whose
/// path is `/_proxy/health` or `/_proxy/stats` reaches the admin handler.
///
/// # Middleware (outermost first)
/// - Request ID: numbers each request, echoed as `X-Request-ID`
/// - Tracing: logs every request with its latency
/// - CORS: Allows any origin
/// - Security headers on every response
/// - Gzip compression when the client accepts it
/// - Per-client rate limit (429)
/// - Request body size limit (413)
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/_proxy/health", get(health_handler))
        .route("/_proxy/stats", get(stats_handler))
        .fallback(dispatch_handler)
        .layer(RequestBodyLimitLayer::new(state.max_body_size))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.limiter),
            rate_limit,
        ))
        .layer(CompressionLayer::new());

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            name,
            HeaderValue::from_static(value),
        ));
    }

    router
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Millis),
            ),
        )
        .layer(SetRequestIdLayer::x_request_id(SequentialRequestId::default()))
        .with_state(state)
}
