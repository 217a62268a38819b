//! Proxy Policy
//!
//! Target resolution, the domain allow-list and the cacheability rules for
//! requests and responses.

use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use url::{form_urlencoded, Url};

use crate::error::{ProxyError, Result};

// == Target Resolution ==
/// Works out which URL the client wants fetched.
///
/// A non-empty `url` query parameter wins. Otherwise the request itself must
/// be an absolute-URI proxy request.
pub fn resolve_target(uri: &Uri) -> Result<Url> {
    let param = uri.query().and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name == "url")
            .map(|(_, value)| value.into_owned())
    });

    match param {
        Some(target) if !target.is_empty() => {
            Url::parse(&target).map_err(ProxyError::InvalidTarget)
        }
        _ => {
            if uri.scheme().is_none() || uri.authority().is_none() {
                return Err(ProxyError::MissingTarget);
            }
            Url::parse(&uri.to_string()).map_err(ProxyError::InvalidTarget)
        }
    }
}

/// Host the allow-list is checked against: `host`, or `host:port` when the
/// target names a non-default port.
pub fn target_host(target: &Url) -> String {
    let host = target.host_str().unwrap_or_default();
    match target.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

// == Domain Filter ==
/// Allow-list of target host suffixes.
#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    domains: Vec<String>,
    strict: bool,
}

impl DomainFilter {
    /// Plain string-suffix matching: `example.com` also admits
    /// `evil-example.com`.
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains,
            strict: false,
        }
    }

    /// Label-boundary matching: the host must equal a domain or end with
    /// `.` followed by it.
    pub fn strict(domains: Vec<String>) -> Self {
        Self {
            domains,
            strict: true,
        }
    }

    /// An empty allow-list admits every host.
    pub fn is_allowed(&self, host: &str) -> bool {
        if self.domains.is_empty() {
            return true;
        }

        self.domains.iter().any(|domain| {
            if self.strict {
                host == domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            } else {
                host.ends_with(domain.as_str())
            }
        })
    }
}

// == Cacheability ==
fn cache_control_has_no_store(headers: &HeaderMap) -> bool {
    headers
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("no-store"))
}

fn has_non_empty(headers: &HeaderMap, name: header::HeaderName) -> bool {
    headers.get(name).is_some_and(|v| !v.is_empty())
}

/// GET/HEAD without credentials and without `Cache-Control: no-store`.
pub fn is_request_cacheable(method: &Method, headers: &HeaderMap) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }
    if has_non_empty(headers, header::AUTHORIZATION) {
        return false;
    }
    !cache_control_has_no_store(headers)
}

/// Exactly 200, no `Cache-Control: no-store` and no `Set-Cookie`.
pub fn is_response_cacheable(status: StatusCode, headers: &HeaderMap) -> bool {
    if status != StatusCode::OK {
        return false;
    }
    if cache_control_has_no_store(headers) {
        return false;
    }
    !has_non_empty(headers, header::SET_COOKIE)
}

/// `METHOD:URL`, case-sensitive and otherwise untouched.
pub fn cache_key(method: &Method, target: &Url) -> String {
    format!("{}:{}", method, target)
}
