//! Error types for the proxy
//!
//! Every pipeline failure resolves to an HTTP status and a plaintext body
//! before it leaves the proxy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

// == Proxy Error Enum ==
/// Failures produced while handling a proxied request.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Neither a `url` parameter nor an absolute request URI
    #[error("Invalid proxy request. URL must include scheme and host.")]
    MissingTarget,

    /// The `url` parameter could not be parsed
    #[error("Invalid URL format")]
    InvalidTarget(#[source] url::ParseError),

    /// The inbound body could not be read
    #[error("Error reading request body: {0}")]
    InvalidBody(String),

    /// Target host is not covered by the allow-list
    #[error("Domain not allowed")]
    DomainNotAllowed { host: String },

    /// Connect failure, timeout or redirect limit
    #[error("Error forwarding request: {0}")]
    BadGateway(#[source] reqwest::Error),

    /// The client used up its request budget for the current window
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The worker pool no longer accepts jobs
    #[error("Proxy is shutting down")]
    PoolStopped,

    /// A worker panicked or dropped the job
    #[error("Internal proxy error")]
    WorkerFailed,

    /// The upstream HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingTarget
            | ProxyError::InvalidTarget(_)
            | ProxyError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::DomainNotAllowed { .. } => StatusCode::FORBIDDEN,
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ProxyError::PoolStopped => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::WorkerFailed | ProxyError::HttpClient(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // String bodies are sent as text/plain; charset=utf-8
        (self.status(), self.to_string()).into_response()
    }
}

// == Result Type Alias ==
pub type Result<T> = std::result::Result<T, ProxyError>;
