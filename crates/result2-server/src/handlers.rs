use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use result2_cache::BreakerSnapshot;
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache: CacheHealth,
}

#[derive(Debug, Serialize)]
pub struct CacheHealth {
    pub backend: &'static str,
    pub available: bool,
    pub breaker: BreakerSnapshot,
}

/// Process health plus the cache's degraded state. Always 200: an open
/// circuit means the cache is bypassed, not that the service is down.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let cache = &state.cache;
    let available = cache.is_available();
    let body = HealthResponse {
        status: if available { "ok" } else { "degraded" },
        cache: CacheHealth {
            backend: cache.backend_name(),
            available,
            breaker: cache.breaker().snapshot(),
        },
    };
    (StatusCode::OK, Json(body))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
