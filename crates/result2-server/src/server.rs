use std::net::SocketAddr;

use axum::{Router, middleware, routing::get};
use metrics_exporter_prometheus::PrometheusHandle;
use result2_cache::{CacheService, ResponseCacheState, response_cache};
use tower_http::trace::TraceLayer;

use crate::{config::AppConfig, handlers};

/// Shared state for the server's own endpoints.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheService,
    /// `None` when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,
}

pub struct Result2Server {
    addr: SocketAddr,
    app: Router,
}

/// Build the HTTP application.
///
/// `routes` are the application's own routes; they sit behind the response
/// cache middleware when `cache.enabled` is set.
pub fn build_app(cfg: &AppConfig, cache: CacheService, routes: Router) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let state = AppState {
        cache: cache.clone(),
        metrics: crate::metrics::install(&cfg.metrics),
    };

    // Only application routes sit behind the response cache.
    let routes = if cfg.cache.enabled {
        let cache_state = ResponseCacheState::from_settings(cache, &cfg.cache);
        routes.layer(middleware::from_fn_with_state(cache_state, response_cache))
    } else {
        tracing::info!("Response cache disabled");
        routes
    };

    let app = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .merge(routes);

    app.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                use tracing::field::Empty;
                tracing::info_span!(
                    "http.request",
                    http.method = %req.method(),
                    http.target = %req.uri(),
                    http.status_code = Empty,
                )
            })
            .on_response(
                |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                    span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                    let cache = res
                        .headers()
                        .get(result2_cache::X_CACHE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info!(
                        http.status = res.status().as_u16(),
                        elapsed_ms = latency.as_millis() as u64,
                        cache,
                        "request handled"
                    );
                },
            ),
    )
    .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    config: AppConfig,
    routes: Router,
    cache: Option<CacheService>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            routes: Router::new(),
            cache: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Application routes served behind the response cache.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = routes;
        self
    }

    /// Use an existing cache service instead of creating one from config.
    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn build(self) -> Result2Server {
        let cache = match self.cache {
            Some(cache) => cache,
            None => crate::create_cache_service(&self.config).await,
        };
        Result2Server {
            addr: self.config.addr(),
            app: build_app(&self.config, cache, self.routes),
        }
    }
}

impl Result2Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
