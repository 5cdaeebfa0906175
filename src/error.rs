//! Unified error types for fanfetch.
//!
//! Three layers, all `thiserror` derived:
//!
//! - [`FetchError`] is the per-target taxonomy. It is captured into a
//!   [`FetchOutcome`](crate::fetch::outcome::FetchOutcome) and never aborts
//!   sibling targets.
//! - [`DispatchError`] rejects a whole call before any target is fetched
//!   (admission, empty or oversized target lists, malformed URLs).
//! - [`FanfetchError`] covers the process itself: config loading, CLI
//!   subcommands, server startup.

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}.{}: {}", self.section, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FanfetchError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}

/// Coarse failure classes the HTTP layer maps to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    DeadlineExceeded,
    Cancelled,
    Upstream,
}

/// Why a single target could not be fetched.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("circuit breaker open for {endpoint}")]
    BreakerOpen { endpoint: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("upstream responded with status {status}")]
    UpstreamStatus { status: u16, body: Bytes },

    #[error("response body could not be decoded: {message}")]
    Decode { message: String, body: Bytes },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// A malformed payload stays malformed, and a fired deadline stays fired.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BreakerOpen { .. } | Self::Transport { .. } | Self::UpstreamStatus { .. }
        )
    }

    /// Whether the failure says something about the endpoint's health.
    pub const fn trips_breaker(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::UpstreamStatus { .. })
    }

    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::DeadlineExceeded => FailureClass::DeadlineExceeded,
            Self::Cancelled => FailureClass::Cancelled,
            _ => FailureClass::Upstream,
        }
    }

    /// Stable machine-readable name, used in JSON responses.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BreakerOpen { .. } => "breaker_open",
            Self::Transport { .. } => "transport",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::Decode { .. } => "decode",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The upstream body carried by a status or decode failure.
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::UpstreamStatus { body, .. } | Self::Decode { body, .. } => Some(body),
            _ => None,
        }
    }

    pub(crate) fn transport(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::Transport {
            message: error_chain(err),
        }
    }
}

/// Render an error together with its `source()` chain on one line.
///
/// hyper's client errors are terse at the top level ("client error (Connect)");
/// the interesting part is usually two or three sources down.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

/// Why a whole fetch call was refused before any target was considered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("rate limit exceeded for client {client}")]
    AdmissionRejected { client: String },

    #[error("no targets provided")]
    NoTargets,

    #[error("too many targets: {count} (maximum {max})")]
    TooManyTargets { count: usize, max: usize },

    #[error("invalid target '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },
}

impl DispatchError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AdmissionRejected { .. } => "admission_rejected",
            Self::NoTargets => "no_targets",
            Self::TooManyTargets { .. } => "too_many_targets",
            Self::InvalidTarget { .. } => "invalid_target",
        }
    }
}
