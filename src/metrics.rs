//! Metrics index and individual metric endpoints.
//!
//! `GET /metrics` lists the metric names; `GET /metrics/{name}` returns one
//! measurement. Counters are `COUNT`, point-in-time readings are `VALUE`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct MetricsIndexResponse {
    pub names: Vec<String>,
}

pub const METRIC_NAMES: &[&str] = &[
    "requests.dispatched",
    "requests.rejected",
    "requests.invalid",
    "targets.succeeded",
    "targets.failed",
    "targets.cached",
    "cache.hits",
    "cache.misses",
    "cache.entries",
    "breaker.opened",
    "breaker.half_opened",
    "breaker.closed",
    "breaker.rejected",
    "breakers.open",
    "ratelimit.clients",
    "uptime.seconds",
];

pub async fn metrics_index() -> Json<MetricsIndexResponse> {
    Json(MetricsIndexResponse {
        names: METRIC_NAMES.iter().map(|n| (*n).to_string()).collect(),
    })
}

#[derive(Serialize, Deserialize)]
pub struct MetricDetailResponse {
    pub name: String,
    pub measurement: MetricMeasurement,
}

#[derive(Serialize, Deserialize)]
pub struct MetricMeasurement {
    pub statistic: String,
    pub value: f64,
}

#[allow(clippy::cast_precision_loss)]
fn count(counter: &AtomicU64) -> (&'static str, f64) {
    ("COUNT", counter.load(Ordering::Relaxed) as f64)
}

#[allow(clippy::cast_precision_loss)]
fn value(reading: usize) -> (&'static str, f64) {
    ("VALUE", reading as f64)
}

/// Current reading of `name`, or `None` for an unknown metric.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn measure(state: &AppState, name: &str) -> Option<(&'static str, f64)> {
    let orchestrator = &state.orchestrator;
    let fetch = orchestrator.stats();
    let cache = orchestrator.cache();
    let breakers = orchestrator.breakers();

    let reading = match name {
        "requests.dispatched" => count(&fetch.dispatched),
        "requests.rejected" => count(&state.stats.rejected),
        "requests.invalid" => count(&state.stats.invalid),
        "targets.succeeded" => count(&fetch.targets_succeeded),
        "targets.failed" => count(&fetch.targets_failed),
        "targets.cached" => count(&fetch.cache_served),
        "cache.hits" => ("COUNT", cache.hits() as f64),
        "cache.misses" => ("COUNT", cache.misses() as f64),
        "cache.entries" => value(cache.len()),
        "breaker.opened" => count(&breakers.stats().opened),
        "breaker.half_opened" => count(&breakers.stats().half_opened),
        "breaker.closed" => count(&breakers.stats().closed),
        "breaker.rejected" => count(&breakers.stats().rejected),
        "breakers.open" => value(breakers.open_count()),
        "ratelimit.clients" => value(state.limiter.clients()),
        "uptime.seconds" => ("VALUE", state.start_time.elapsed().as_secs_f64()),
        _ => return None,
    };
    Some(reading)
}

pub async fn metric_detail(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<MetricDetailResponse>, StatusCode> {
    let (statistic, value) = measure(&state, &name).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(MetricDetailResponse {
        name,
        measurement: MetricMeasurement {
            statistic: statistic.to_string(),
            value,
        },
    }))
}
