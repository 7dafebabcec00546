//! Read-through / write-through HTTP response cache.
//!
//! ## Request flow
//!
//! ```text
//! GET /results?term=2 ─► before_request ─► hit?  ─► cached response (x-cache: HIT)
//!                                          │
//!                                          miss ─► handler ─► after_response ─► store if 200
//! ```
//!
//! Only `GET` requests outside the excluded prefixes take part. Mount with
//! [`axum::middleware::from_fn_with_state`] and [`response_cache`].

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::key::{KeyFormatter, TenantContext};
use crate::metrics;
use crate::service::CacheService;
use crate::settings::{CacheSettings, PathTtl};

/// Response header reporting whether the cache served the request.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Headers that describe the connection rather than the resource.
static UNCACHEABLE_HEADERS: [HeaderName; 7] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
    header::SET_COOKIE,
];

/// Cache outcome for a request, recorded in request and response extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Hit { key: String },
    Miss { key: String },
}

impl CacheStatus {
    pub fn key(&self) -> &str {
        match self {
            CacheStatus::Hit { key } | CacheStatus::Miss { key } => key,
        }
    }

    fn header_value(&self) -> HeaderValue {
        match self {
            CacheStatus::Hit { .. } => HeaderValue::from_static("HIT"),
            CacheStatus::Miss { .. } => HeaderValue::from_static("MISS"),
        }
    }
}

/// Serialized form of a cached HTTP response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, Bytes)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let headers = headers
            .iter()
            .filter(|(name, _)| !UNCACHEABLE_HEADERS.contains(*name))
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    Bytes::copy_from_slice(value.as_bytes()),
                )
            })
            .collect();
        Self {
            status: status.as_u16(),
            headers,
            body,
        }
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_maybe_shared(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::debug!(header = %name, "Dropping invalid cached header"),
            }
        }
        response
    }
}

/// Static path rules: which paths take part and for how long they are cached.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    ttls: Vec<PathTtl>,
    excluded: Vec<String>,
    default_ttl: Duration,
    max_body_bytes: usize,
}

impl PathPolicy {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            ttls: settings.path_ttls.clone(),
            excluded: settings.excluded_prefixes.clone(),
            default_ttl: settings.default_ttl(),
            max_body_bytes: settings.max_body_bytes,
        }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Whether a request with this method and path takes part in caching.
    pub fn applies(&self, method: &Method, path: &str) -> bool {
        *method == Method::GET && !self.is_excluded(path)
    }

    /// TTL of the longest matching prefix, else the default.
    pub fn ttl_for(&self, path: &str) -> Duration {
        // max_by_key keeps the last maximum; iterate reversed so the first
        // configured entry wins a tie.
        self.ttls
            .iter()
            .rev()
            .filter(|entry| path.starts_with(entry.prefix.as_str()))
            .max_by_key(|entry| entry.prefix.len())
            .map(|entry| Duration::from_secs(entry.ttl_secs))
            .unwrap_or(self.default_ttl)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

/// Result of the pre-handling hook.
#[derive(Debug)]
pub enum PreOutcome {
    /// Not cacheable; run the handler normally.
    Skip,
    /// Served from cache; return this response as-is.
    Hit(Response),
    /// Not in cache; run the handler and pass this status to the post hook.
    Miss(CacheStatus),
}

/// Shared state for the response cache middleware.
#[derive(Clone)]
pub struct ResponseCacheState {
    cache: CacheService,
    policy: Arc<PathPolicy>,
}

impl ResponseCacheState {
    pub fn new(cache: CacheService, policy: PathPolicy) -> Self {
        Self {
            cache,
            policy: Arc::new(policy),
        }
    }

    pub fn from_settings(cache: CacheService, settings: &CacheSettings) -> Self {
        Self::new(cache, PathPolicy::from_settings(settings))
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// Look the request up in the cache.
    pub async fn before_request(
        &self,
        method: &Method,
        uri: &Uri,
        ctx: &TenantContext,
    ) -> PreOutcome {
        let path = uri.path();
        if !self.policy.applies(method, path) {
            return PreOutcome::Skip;
        }

        let key = KeyFormatter::scoped(KeyFormatter::view_key(ctx, path, uri.query()), ctx);

        match self.cache.get::<CachedResponse>(ctx, &key).await {
            Some(cached) => {
                tracing::debug!(key = %key, "Cache hit");
                metrics::record_cache_hit("response");
                let status = CacheStatus::Hit { key };
                let mut response = cached.into_response();
                response.headers_mut().insert(X_CACHE, status.header_value());
                response.extensions_mut().insert(status);
                PreOutcome::Hit(response)
            }
            None => {
                metrics::record_cache_miss("response");
                PreOutcome::Miss(CacheStatus::Miss { key })
            }
        }
    }

    /// Store a successful response produced after a cache miss.
    pub async fn after_response(
        &self,
        method: &Method,
        path: &str,
        ctx: &TenantContext,
        status: Option<&CacheStatus>,
        response: Response,
    ) -> Response {
        if !self.policy.applies(method, path) || response.status() != StatusCode::OK {
            return response;
        }
        let Some(CacheStatus::Miss { key }) = status else {
            return response;
        };

        let size = response.body().size_hint().exact();
        if !size.is_some_and(|n| n <= self.policy.max_body_bytes as u64) {
            tracing::debug!(key = %key, size = ?size, "Response body not cacheable by size");
            return response;
        }

        let (mut parts, body) = response.into_parts();
        let bytes = match axum::body::to_bytes(body, self.policy.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to buffer response body");
                parts.status = StatusCode::INTERNAL_SERVER_ERROR;
                return Response::from_parts(parts, Body::empty());
            }
        };

        let ttl = self.policy.ttl_for(path);
        let cached = CachedResponse::new(parts.status, &parts.headers, bytes.clone());
        if self.cache.set(ctx, key, &cached, Some(ttl)).await {
            tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached response");
        }

        parts.headers.insert(X_CACHE, CacheStatus::Miss { key: key.clone() }.header_value());
        parts.extensions.insert(CacheStatus::Miss { key: key.clone() });
        Response::from_parts(parts, Body::from(bytes))
    }
}

/// Response cache middleware.
///
/// Reads the [`TenantContext`] from the request extensions (global scope if
/// absent). A cache hit short-circuits the handler.
pub async fn response_cache(
    State(state): State<ResponseCacheState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let ctx = tenant_context(&req);

    let status = match state.before_request(&method, &uri, &ctx).await {
        PreOutcome::Skip => return next.run(req).await,
        PreOutcome::Hit(response) => return response,
        PreOutcome::Miss(status) => status,
    };

    req.extensions_mut().insert(status.clone());

    let response = next.run(req).await;
    state
        .after_response(&method, uri.path(), &ctx, Some(&status), response)
        .await
}

fn tenant_context<B>(req: &Request<B>) -> TenantContext {
    req.extensions()
        .get::<TenantContext>()
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PathPolicy {
        PathPolicy::from_settings(&CacheSettings::default())
    }

    #[test]
    fn only_get_outside_exclusions_applies() {
        let policy = policy();
        assert!(policy.applies(&Method::GET, "/results/42"));
        assert!(!policy.applies(&Method::POST, "/results/42"));
        assert!(!policy.applies(&Method::HEAD, "/results/42"));
        assert!(!policy.applies(&Method::GET, "/admin/users"));
        assert!(!policy.applies(&Method::GET, "/static/app.css"));
        assert!(!policy.applies(&Method::GET, "/api/health"));
    }

    #[test]
    fn ttl_prefers_longest_prefix() {
        let mut settings = CacheSettings::default();
        settings.path_ttls = vec![
            PathTtl::new("/api/", 60),
            PathTtl::new("/api/results", 900),
            PathTtl::new("/api/", 5),
        ];
        let policy = PathPolicy::from_settings(&settings);
        assert_eq!(policy.ttl_for("/api/results/7"), Duration::from_secs(900));
        assert_eq!(policy.ttl_for("/api/students"), Duration::from_secs(60));
        assert_eq!(policy.ttl_for("/reports"), Duration::from_secs(300));
    }

    #[test]
    fn default_table_ttls() {
        let policy = policy();
        assert_eq!(policy.ttl_for("/dashboard"), Duration::from_secs(60));
        assert_eq!(policy.ttl_for("/results/term/2"), Duration::from_secs(600));
        assert_eq!(policy.ttl_for("/student/9"), Duration::from_secs(600));
        assert_eq!(policy.ttl_for("/api/grades"), Duration::from_secs(60));
    }

    #[test]
    fn cached_response_drops_connection_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("session=abc"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let cached = CachedResponse::new(StatusCode::OK, &headers, Bytes::from_static(b"<h1>"));
        let names: Vec<_> = cached.headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["content-type"]);

        let response = cached.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}
