//! Per-client rate limiting in front of `/fetch`.
//!
//! The client key is the first `X-Forwarded-For` entry when present,
//! otherwise the peer IP. Rejected calls get `429` and never reach the
//! orchestrator.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::{self, REQUEST_ID};
use crate::server::AppState;

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let request_id = api::request_id(request.headers());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID, value);
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(request.headers(), peer);

    match state.limiter.admit(&client) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            state.stats.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(request_id = %request_id, client = %client, "rate limit exceeded");
            api::dispatch_error_response(&request_id, &e)
        }
    }
}

/// First `X-Forwarded-For` hop, else the peer IP, else `"unknown"`.
#[must_use]
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
