//! Integration tests for the metrics endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;

use fanfetch::config::model::Config;
use fanfetch::config::ConfigVersion;
use fanfetch::metrics::{MetricDetailResponse, MetricsIndexResponse, METRIC_NAMES};
use fanfetch::server::{self, AppState, LoadedConfig};

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/ok", get(|| async { r#"{"ok":true}"# }))
        .route(
            "/down",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_test_server() -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let mut config = Config::default();
    config.retry.max_attempts = 1;
    config.breaker.failure_threshold = 1;

    let state = Arc::new(AppState::from_config(LoadedConfig {
        config: Arc::new(config),
        version: ConfigVersion::Builtin,
        source_name: "builtin".into(),
        loaded_at: Instant::now(),
    }));

    let router = server::build_router(state, 65_536);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .unwrap();
    });

    (addr, shutdown_tx)
}

async fn metric(addr: SocketAddr, name: &str) -> MetricDetailResponse {
    let resp = reqwest::get(format!("http://{addr}/metrics/{name}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "metric {name}");
    resp.json().await.unwrap()
}

#[tokio::test]
async fn index_lists_every_metric() {
    let (addr, _shutdown) = start_test_server().await;

    let index: MetricsIndexResponse = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(index.names.len(), METRIC_NAMES.len());
    assert!(index.names.iter().any(|n| n == "cache.hits"));

    for name in METRIC_NAMES {
        metric(addr, name).await;
    }
}

#[tokio::test]
async fn unknown_metric_is_404() {
    let (addr, _shutdown) = start_test_server().await;

    let resp = reqwest::get(format!("http://{addr}/metrics/nope"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn counters_follow_fetch_activity() {
    // separate endpoints so each gets its own breaker
    let healthy = spawn_upstream().await;
    let failing = spawn_upstream().await;
    let (addr, _shutdown) = start_test_server().await;

    let url = format!(
        "http://{addr}/fetch?format=raw&url=http://{healthy}/ok&url=http://{failing}/down"
    );
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 207);
    // second call: /ok from cache, /down rejected by the open breaker
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 207);

    let dispatched = metric(addr, "requests.dispatched").await;
    assert_eq!(dispatched.measurement.statistic, "COUNT");
    assert!((dispatched.measurement.value - 2.0).abs() < f64::EPSILON);

    let succeeded = metric(addr, "targets.succeeded").await;
    assert!((succeeded.measurement.value - 2.0).abs() < f64::EPSILON);

    let failed = metric(addr, "targets.failed").await;
    assert!((failed.measurement.value - 2.0).abs() < f64::EPSILON);

    let hits = metric(addr, "cache.hits").await;
    assert!((hits.measurement.value - 1.0).abs() < f64::EPSILON);

    let cached = metric(addr, "targets.cached").await;
    assert_eq!(cached.measurement.statistic, "COUNT");
    assert!((cached.measurement.value - 1.0).abs() < f64::EPSILON);

    let clients = metric(addr, "ratelimit.clients").await;
    assert_eq!(clients.measurement.statistic, "VALUE");
    assert!((clients.measurement.value - 1.0).abs() < f64::EPSILON);

    let opened = metric(addr, "breaker.opened").await;
    assert!((opened.measurement.value - 1.0).abs() < f64::EPSILON);

    let open_now = metric(addr, "breakers.open").await;
    assert_eq!(open_now.measurement.statistic, "VALUE");
    assert!((open_now.measurement.value - 1.0).abs() < f64::EPSILON);
}
