//! JSON bodies returned by `/fetch`, and the status-code mapping.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, FailureClass, FetchError};
use crate::fetch::{AggregateResult, AggregateStatus, FetchOutcome, FetchSource, PayloadFormat};

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchResponse {
    pub request_id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub results: Vec<TargetResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TargetResult {
    pub url: String,
    pub status: u16,
    pub source: FetchSource,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    /// Start of the upstream's error body, for non-2xx responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Longest upstream error body echoed back, in bytes.
pub const ERROR_BODY_LIMIT: usize = 1024;

fn truncated_text(bytes: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= limit {
        return text.into_owned();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Body for calls refused before any fetching (400, 429).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

impl From<&FetchError> for ErrorBody {
    fn from(e: &FetchError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            upstream_status: e.upstream_status(),
            body: match e {
                FetchError::UpstreamStatus { body, .. } if !body.is_empty() => {
                    Some(truncated_text(body, ERROR_BODY_LIMIT))
                }
                _ => None,
            },
        }
    }
}

impl From<&DispatchError> for ErrorBody {
    fn from(e: &DispatchError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            upstream_status: None,
            body: None,
        }
    }
}

pub const fn dispatch_status(e: &DispatchError) -> StatusCode {
    match e {
        DispatchError::AdmissionRejected { .. } => StatusCode::TOO_MANY_REQUESTS,
        DispatchError::NoTargets
        | DispatchError::TooManyTargets { .. }
        | DispatchError::InvalidTarget { .. } => StatusCode::BAD_REQUEST,
    }
}

/// 200 when everything succeeded, 207 for a mix, otherwise a status for
/// the dominant failure class.
pub const fn aggregate_status(status: AggregateStatus) -> StatusCode {
    match status {
        AggregateStatus::AllSucceeded => StatusCode::OK,
        AggregateStatus::Partial => StatusCode::MULTI_STATUS,
        AggregateStatus::AllFailed(FailureClass::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT,
        AggregateStatus::AllFailed(FailureClass::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
        AggregateStatus::AllFailed(FailureClass::Upstream) => StatusCode::BAD_GATEWAY,
    }
}

/// Status reported for a single target inside the results array.
pub fn outcome_status(outcome: &FetchOutcome) -> u16 {
    match &outcome.result {
        Ok(_) => outcome.http_status.unwrap_or(200),
        Err(FetchError::UpstreamStatus { status, .. }) => *status,
        Err(FetchError::Decode { .. }) => StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
        Err(FetchError::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT.as_u16(),
        Err(FetchError::Cancelled | FetchError::BreakerOpen { .. }) => {
            StatusCode::SERVICE_UNAVAILABLE.as_u16()
        }
        Err(FetchError::Transport { .. }) => StatusCode::BAD_GATEWAY.as_u16(),
    }
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// The payload as JSON or text. A body that failed to decode is returned as
/// text so the caller can see what the upstream actually sent.
fn render_payload(outcome: &FetchOutcome) -> Option<serde_json::Value> {
    let payload = match &outcome.result {
        Ok(payload) => payload,
        Err(FetchError::Decode { body, .. }) => {
            return Some(serde_json::Value::String(
                String::from_utf8_lossy(body).into_owned(),
            ));
        }
        Err(_) => return None,
    };
    let text = || serde_json::Value::String(String::from_utf8_lossy(payload).into_owned());
    Some(match outcome.target.format() {
        PayloadFormat::Json => serde_json::from_slice(payload).unwrap_or_else(|_| text()),
        PayloadFormat::Raw => text(),
    })
}

impl TargetResult {
    #[must_use]
    pub fn from_outcome(outcome: &FetchOutcome) -> Self {
        Self {
            url: outcome.target.url().to_string(),
            status: outcome_status(outcome),
            source: outcome.source,
            latency_ms: millis(outcome.latency),
            data: render_payload(outcome),
            error: outcome.error().map(ErrorBody::from),
        }
    }
}

impl FetchResponse {
    #[must_use]
    pub fn new(request_id: String, aggregate: &AggregateResult, elapsed: std::time::Duration) -> Self {
        Self {
            request_id,
            success: aggregate.success,
            duration_ms: millis(elapsed),
            results: aggregate
                .outcomes
                .iter()
                .map(TargetResult::from_outcome)
                .collect(),
        }
    }
}
