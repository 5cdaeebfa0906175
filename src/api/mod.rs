//! `/fetch` handlers.
//!
//! [`fetch_query`] takes targets as repeated `url` query parameters;
//! [`fetch_json`] takes a JSON body with per-target headers and formats.
//! Both validate the target list, run it through the
//! [`Orchestrator`](crate::fetch::Orchestrator) under a context derived from
//! the server's shutdown token, and render the ordered [`response`] body.

pub mod response;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::error::DispatchError;
use crate::fetch::{AggregateStatus, FetchContext, FetchTarget, PayloadFormat};
use crate::server::AppState;

use response::{ErrorBody, ErrorResponse, FetchResponse};

pub const REQUEST_ID: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// The caller's request id if it sent a usable one, otherwise a fresh UUID.
#[must_use]
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchRequest {
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub format: PayloadFormat,
}

/// `GET /fetch?url=..&url=..[&format=raw|json]`
pub async fn fetch_query(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id(&headers);
    let query = query.unwrap_or_default();

    let mut urls = Vec::new();
    let mut format = PayloadFormat::Json;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "url" => urls.push(value.into_owned()),
            "format" => match value.as_ref() {
                "json" => format = PayloadFormat::Json,
                "raw" => format = PayloadFormat::Raw,
                other => {
                    return bad_request(
                        &state,
                        &request_id,
                        "invalid_format",
                        format!("unknown format '{other}' (expected json or raw)"),
                    );
                }
            },
            _ => {}
        }
    }

    let specs = urls
        .into_iter()
        .map(|url| TargetSpec {
            url,
            headers: BTreeMap::new(),
            format,
        })
        .collect();
    run_fetch(&state, request_id, specs).await
}

/// `POST /fetch` with `{"targets": [{"url", "headers", "format"}]}`
pub async fn fetch_json(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<FetchRequest>, JsonRejection>,
) -> Response {
    let request_id = request_id(&headers);
    match payload {
        Ok(Json(request)) => run_fetch(&state, request_id, request.targets).await,
        Err(rejection) => bad_request(&state, &request_id, "invalid_body", rejection.body_text()),
    }
}

async fn run_fetch(state: &AppState, request_id: String, specs: Vec<TargetSpec>) -> Response {
    let started = Instant::now();
    let orchestrator = &state.orchestrator;

    if let Err(e) = orchestrator.validate_count(specs.len()) {
        return invalid(state, &request_id, &e);
    }

    let targets: Result<Vec<FetchTarget>, DispatchError> = specs
        .iter()
        .map(|spec| {
            FetchTarget::from_parts(
                &spec.url,
                spec.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                spec.format,
            )
        })
        .collect();
    let targets = match targets {
        Ok(targets) => targets,
        Err(e) => return invalid(state, &request_id, &e),
    };

    tracing::info!(
        request_id = %request_id,
        targets = targets.len(),
        "fetch received"
    );

    let ctx = FetchContext::child_of(&state.shutdown, state.config().fetch.deadline());
    let aggregate = match orchestrator.dispatch(&ctx, targets).await {
        Ok(aggregate) => aggregate,
        Err(e) => return invalid(state, &request_id, &e),
    };

    let classification = aggregate.classification();
    let status = response::aggregate_status(classification);
    if let AggregateStatus::AllFailed(class) = classification {
        tracing::warn!(request_id = %request_id, class = ?class, "every target failed");
    }

    let body = FetchResponse::new(request_id.clone(), &aggregate, started.elapsed());
    tracing::info!(
        request_id = %request_id,
        status = status.as_u16(),
        succeeded = aggregate.succeeded(),
        failed = aggregate.failed(),
        duration_ms = body.duration_ms,
        "fetch completed"
    );

    (status, [(REQUEST_ID, request_id)], Json(body)).into_response()
}

fn invalid(state: &AppState, request_id: &str, e: &DispatchError) -> Response {
    state.stats.invalid.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(request_id = %request_id, error = %e, "fetch rejected");
    dispatch_error_response(request_id, e)
}

fn bad_request(state: &AppState, request_id: &str, kind: &str, message: String) -> Response {
    state.stats.invalid.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(request_id = %request_id, error = %message, "fetch rejected");
    let body = ErrorResponse {
        request_id: request_id.to_string(),
        error: ErrorBody {
            kind: kind.to_string(),
            message,
            upstream_status: None,
            body: None,
        },
    };
    (
        StatusCode::BAD_REQUEST,
        [(REQUEST_ID, request_id.to_string())],
        Json(body),
    )
        .into_response()
}

/// Render a whole-call refusal with its status code and request id.
#[must_use]
pub fn dispatch_error_response(request_id: &str, e: &DispatchError) -> Response {
    let body = ErrorResponse {
        request_id: request_id.to_string(),
        error: ErrorBody::from(e),
    };
    (
        response::dispatch_status(e),
        [(REQUEST_ID, request_id.to_string())],
        Json(body),
    )
        .into_response()
}
