//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server version,
//! uptime, config source metadata, cumulative statistics, the result of a
//! cache round-trip probe and a snapshot of every circuit breaker. Responds
//! `503` when any check fails.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::breaker::{BreakerSnapshot, BreakerState};
use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub stats: StatsResponse,
    pub checks: BTreeMap<String, CheckResult>,
    pub breakers: Vec<BreakerHealth>,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub max_targets: usize,
    pub deadline_ms: u64,
    pub cache_ttl_ms: u64,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_dispatched: u64,
    pub requests_rejected: u64,
    pub requests_invalid: u64,
    pub targets_succeeded: u64,
    pub targets_failed: u64,
    pub targets_cached: u64,
    pub cache_entries: usize,
}

#[derive(Serialize, Deserialize)]
pub struct CheckResult {
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct BreakerHealth {
    pub endpoint: String,
    pub state: BreakerState,
    pub failures: u32,
    pub since_transition_ms: u64,
}

impl From<BreakerSnapshot> for BreakerHealth {
    fn from(s: BreakerSnapshot) -> Self {
        Self {
            endpoint: s.endpoint,
            state: s.state,
            failures: s.failures,
            since_transition_ms: s.since_transition_ms,
        }
    }
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let loaded = &state.loaded;
    let config = &loaded.config;
    let orchestrator = &state.orchestrator;
    let fetch_stats = orchestrator.stats();

    let mut checks = BTreeMap::new();
    let cache_check = match orchestrator.cache().probe() {
        Ok(()) => CheckResult {
            healthy: true,
            error: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "cache health probe failed");
            CheckResult {
                healthy: false,
                error: Some(e),
            }
        }
    };
    checks.insert("cache".to_string(), cache_check);

    let healthy = checks.values().all(|c| c.healthy);
    let version = loaded.version.to_string();

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: loaded.source_name.clone(),
            version: version.get(..8).unwrap_or(&version).to_string(),
            loaded_ago_seconds: loaded.loaded_at.elapsed().as_secs(),
            max_targets: config.fetch.max_targets,
            deadline_ms: config.fetch.deadline_ms,
            cache_ttl_ms: config.cache.ttl_ms,
        },
        stats: StatsResponse {
            requests_dispatched: fetch_stats.dispatched.load(Ordering::Relaxed),
            requests_rejected: state.stats.rejected.load(Ordering::Relaxed),
            requests_invalid: state.stats.invalid.load(Ordering::Relaxed),
            targets_succeeded: fetch_stats.targets_succeeded.load(Ordering::Relaxed),
            targets_failed: fetch_stats.targets_failed.load(Ordering::Relaxed),
            targets_cached: fetch_stats.cache_served.load(Ordering::Relaxed),
            cache_entries: orchestrator.cache().len(),
        },
        checks,
        breakers: orchestrator
            .breakers()
            .snapshots()
            .into_iter()
            .map(BreakerHealth::from)
            .collect(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}
