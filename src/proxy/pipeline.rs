//! Proxy Pipeline
//!
//! Per-request flow: resolve target, check the allow-list, try the cache,
//! fetch upstream on a miss, store what may be stored and answer the client.

use std::net::SocketAddr;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{ConnectInfo, Request};
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use chrono::{TimeDelta, Utc};
use reqwest::redirect;
use tracing::{debug, warn};
use url::Url;

use crate::cache::SharedCache;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::proxy::policy::{
    cache_key, is_request_cacheable, is_response_cacheable, resolve_target, target_host,
    DomainFilter,
};
use crate::proxy::ttl::derive_ttl;
use crate::proxy::wire::CachedResponse;

/// Redirect hops followed before a fetch is abandoned.
pub const MAX_REDIRECTS: usize = 10;

/// Value of the `X-Proxy-Server` header on fetched responses.
pub const PROXY_SERVER_ID: &str = concat!("caching-proxy/", env!("CARGO_PKG_VERSION"));

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
const X_PROXY_SERVER: HeaderName = HeaderName::from_static("x-proxy-server");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

// == Proxy Pipeline ==
/// The request handler every worker runs.
pub struct ProxyPipeline {
    cache: SharedCache,
    client: reqwest::Client,
    domains: DomainFilter,
    default_ttl: Option<TimeDelta>,
    max_body_size: usize,
}

impl ProxyPipeline {
    /// Builds the pipeline and its upstream client from the config.
    pub fn new(cache: SharedCache, config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.proxy_timeout())
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .no_proxy()
            .build()
            .map_err(ProxyError::HttpClient)?;

        let domains = if config.strict_domain_matching {
            DomainFilter::strict(config.allowed_domains.clone())
        } else {
            DomainFilter::new(config.allowed_domains.clone())
        };

        Ok(Self {
            cache,
            client,
            domains,
            default_ttl: config.default_ttl(),
            max_body_size: config.max_body_size,
        })
    }

    // == Handle ==
    /// Handles one request end to end. Errors become plaintext responses.
    pub async fn handle(&self, request: Request) -> Response {
        match self.process(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Proxy request failed: {}", e);
                e.into_response()
            }
        }
    }

    async fn process(&self, request: Request) -> Result<Response> {
        let (parts, body) = request.into_parts();

        let target = resolve_target(&parts.uri)?;
        let host = target_host(&target);
        if !self.domains.is_allowed(&host) {
            return Err(ProxyError::DomainNotAllowed { host });
        }

        let key = cache_key(&parts.method, &target);
        let request_cacheable = is_request_cacheable(&parts.method, &parts.headers);

        if request_cacheable {
            if let Some(response) = self.lookup(&key).await {
                return Ok(response);
            }
            debug!("Cache miss for {}", key);
        }

        // Bodies are buffered so they can be replayed across redirects
        let body = to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| ProxyError::InvalidBody(e.to_string()))?;

        let upstream = self.fetch(&parts, target, body).await?;

        if request_cacheable && is_response_cacheable(upstream.status, &upstream.headers) {
            self.store(&key, &upstream).await;
        }

        let mut response = Response::new(Body::from(upstream.body));
        *response.status_mut() = upstream.status;
        let headers = response.headers_mut();
        *headers = upstream.headers;
        headers.insert(X_PROXY_SERVER, HeaderValue::from_static(PROXY_SERVER_ID));
        headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
        Ok(response)
    }

    // == Cache Lookup ==
    /// Replays a cached response. Undecodable entries count as a miss.
    async fn lookup(&self, key: &str) -> Option<Response> {
        let entry = self.cache.write().await.get(key)?;

        let cached = match CachedResponse::decode(&entry.value) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Error parsing cached response for {}: {}", key, e);
                return None;
            }
        };

        debug!("Cache hit for {}", key);
        let mut response = Response::new(Body::from(cached.body));
        *response.status_mut() = cached.status;
        let headers = response.headers_mut();
        *headers = cached.headers;
        headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
        Some(response)
    }

    // == Upstream Fetch ==
    async fn fetch(&self, parts: &Parts, target: Url, body: Bytes) -> Result<CachedResponse> {
        let headers = forwarded_headers(parts);

        let mut outbound = self
            .client
            .request(parts.method.clone(), target)
            .headers(headers);
        if !body.is_empty() {
            outbound = outbound.body(body);
        }

        let upstream = outbound.send().await.map_err(ProxyError::BadGateway)?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        // The body is buffered, so the upstream framing no longer applies
        headers.remove(header::TRANSFER_ENCODING);
        let body = upstream.bytes().await.map_err(ProxyError::BadGateway)?;

        Ok(CachedResponse::new(status, headers, body))
    }

    // == Cache Store ==
    async fn store(&self, key: &str, upstream: &CachedResponse) {
        let ttl = derive_ttl(&upstream.headers, Utc::now()).or(self.default_ttl);
        let encoded = upstream.encode();
        let size = encoded.len();

        self.cache.write().await.set(key, encoded, ttl);

        match ttl {
            Some(ttl) => debug!(
                "Cached response for {} ({} bytes) with TTL {}s",
                key,
                size,
                ttl.num_seconds()
            ),
            None => debug!("Cached response for {} ({} bytes) without expiry", key, size),
        }
    }
}

/// Headers sent upstream: the client's own, minus `Host` and `Connection`,
/// plus the forwarding headers.
fn forwarded_headers(parts: &Parts) -> HeaderMap {
    let mut headers = parts.headers.clone();
    headers.remove(header::CONNECTION);
    headers.remove(header::HOST);

    let client_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());
    if let Some(value) = client_addr.and_then(|addr| HeaderValue::from_str(&addr).ok()) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    let inbound_host = parts
        .headers
        .get(header::HOST)
        .cloned()
        .or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
        });
    if let Some(value) = inbound_host {
        headers.insert(X_FORWARDED_HOST, value);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{shared, CacheStore};
    use axum::http::StatusCode;

    fn parts(request: Request) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_forwarded_headers() {
        let mut request = Request::builder()
            .uri("/?url=http://example.com/")
            .header("host", "proxy.local:8080")
            .header("connection", "keep-alive")
            .header("accept", "text/html")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 51234))));

        let headers = forwarded_headers(&parts(request));

        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::HOST).is_none());
        assert_eq!(headers.get("accept").unwrap(), "text/html");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.7:51234");
        assert_eq!(headers.get("x-forwarded-host").unwrap(), "proxy.local:8080");
    }

    #[test]
    fn test_forwarded_host_from_absolute_uri() {
        let request = Request::builder()
            .uri("http://example.com/page")
            .body(Body::empty())
            .unwrap();

        let headers = forwarded_headers(&parts(request));

        assert!(headers.get("x-forwarded-for").is_none());
        assert_eq!(headers.get("x-forwarded-host").unwrap(), "example.com");
    }

    #[tokio::test]
    async fn test_lookup_replays_cached_response() {
        let cache = shared(CacheStore::new(4));
        let pipeline = ProxyPipeline::new(cache.clone(), &Config::default()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let cached = CachedResponse::new(StatusCode::OK, headers, Bytes::from_static(b"cached"));
        cache.write().await.set("GET:http://example.com/", cached.encode(), None);

        let response = pipeline.lookup("GET:http://example.com/").await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-cache").unwrap(), "HIT");
        assert_eq!(response.headers().get("content-type").unwrap(), "text/plain");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"cached"));
    }

    #[tokio::test]
    async fn test_lookup_treats_corrupt_entry_as_miss() {
        let cache = shared(CacheStore::new(4));
        let pipeline = ProxyPipeline::new(cache.clone(), &Config::default()).unwrap();
        cache.write().await.set("GET:http://example.com/", "not a response", None);

        assert!(pipeline.lookup("GET:http://example.com/").await.is_none());
    }

    #[tokio::test]
    async fn test_disallowed_domain_is_forbidden() {
        let config = Config {
            allowed_domains: vec!["example.com".to_string()],
            ..Config::default()
        };
        let pipeline = ProxyPipeline::new(shared(CacheStore::new(4)), &config).unwrap();

        let request = Request::builder()
            .uri("/?url=http://other.org/")
            .body(Body::empty())
            .unwrap();
        let response = pipeline.handle(request).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"Domain not allowed"));
    }

    #[tokio::test]
    async fn test_allowed_domain_on_other_port_is_forbidden() {
        let config = Config {
            allowed_domains: vec!["example.com".to_string()],
            ..Config::default()
        };
        let pipeline = ProxyPipeline::new(shared(CacheStore::new(4)), &config).unwrap();

        let request = Request::builder()
            .uri("/?url=http://example.com:1/")
            .body(Body::empty())
            .unwrap();
        let response = pipeline.handle(request).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_not_forwarded() {
        let config = Config {
            max_body_size: 16,
            ..Config::default()
        };
        let pipeline = ProxyPipeline::new(shared(CacheStore::new(4)), &config).unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/?url=http://127.0.0.1:1/")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let response = pipeline.handle(request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
