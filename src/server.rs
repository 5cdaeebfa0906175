//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding the loaded config,
//! orchestrator, rate limiter, stats, uptime and root cancellation token),
//! [`AppState::from_config`] wiring the components together,
//! [`build_router`] for constructing the Axum router with middleware layers,
//! [`build_http_client`] for the connection-pooled hyper client, and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware;
use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::breaker::BreakerRegistry;
use crate::cache::TtlCache;
use crate::config::model::Config;
use crate::config::ConfigVersion;
use crate::fetch::upstream::{HyperUpstream, Upstream};
use crate::fetch::Orchestrator;
use crate::health::health_handler;
use crate::metrics;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::ratelimit::RateLimiter;

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Arc<Config>,
    pub version: ConfigVersion,
    pub source_name: String,
    pub loaded_at: Instant,
}

impl LoadedConfig {
    /// Compiled-in defaults, used when no config file is found.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            config: Arc::new(Config::default()),
            version: ConfigVersion::Builtin,
            source_name: "builtin".into(),
            loaded_at: Instant::now(),
        }
    }
}

/// Call-level counters. Per-target counters live on the orchestrator.
#[derive(Debug)]
pub struct Stats {
    pub rejected: AtomicU64,
    pub invalid: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub const fn new() -> Self {
        Self {
            rejected: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
        }
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub loaded: LoadedConfig,
    pub orchestrator: Orchestrator,
    pub limiter: RateLimiter,
    pub start_time: Instant,
    pub stats: Stats,
    /// Cancelled on shutdown; every call's context is a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire cache, breakers, limiter and orchestrator from `loaded`, using
    /// the real HTTP client.
    #[must_use]
    pub fn from_config(loaded: LoadedConfig) -> Self {
        let fetch = &loaded.config.fetch;
        let upstream = HyperUpstream::new(
            build_http_client(),
            fetch.user_agent_value(),
            fetch.header_map(),
            fetch.attempt_timeout(),
        );
        Self::with_upstream(loaded, Arc::new(upstream))
    }

    #[must_use]
    pub fn with_upstream(loaded: LoadedConfig, upstream: Arc<dyn Upstream>) -> Self {
        let config = &loaded.config;
        let orchestrator = Orchestrator::new(
            Arc::new(TtlCache::new(config.cache.ttl())),
            Arc::new(BreakerRegistry::new(config.breaker.to_breaker_config())),
            upstream,
            config.retry.policy(),
            config.fetch.max_targets,
        );
        let limiter = RateLimiter::new(config.rate_limit.to_limiter_config());

        Self {
            loaded,
            orchestrator,
            limiter,
            start_time: Instant::now(),
            stats: Stats::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.loaded.config
    }
}

pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    let fetch_routes = Router::new()
        .route("/fetch", get(api::fetch_query).post(api::fetch_json))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(fetch_routes)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics::metrics_index))
        .route("/metrics/{name}", get(metrics::metric_detail))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
