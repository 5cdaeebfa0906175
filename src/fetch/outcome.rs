//! Per-target outcomes and the ordered aggregate returned to callers.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{FailureClass, FetchError};

use super::target::FetchTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    Cache,
    Network,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub target: FetchTarget,
    /// Payload on success, error otherwise. Never both.
    pub result: Result<Bytes, FetchError>,
    /// Status of the response that produced this outcome, when there was one.
    pub http_status: Option<u16>,
    pub latency: Duration,
    pub source: FetchSource,
}

impl FetchOutcome {
    pub const fn cached(target: FetchTarget, payload: Bytes, latency: Duration) -> Self {
        Self {
            target,
            result: Ok(payload),
            http_status: None,
            latency,
            source: FetchSource::Cache,
        }
    }

    pub const fn fetched(target: FetchTarget, status: u16, payload: Bytes, latency: Duration) -> Self {
        Self {
            target,
            result: Ok(payload),
            http_status: Some(status),
            latency,
            source: FetchSource::Network,
        }
    }

    pub fn failed(target: FetchTarget, error: FetchError, latency: Duration) -> Self {
        Self {
            target,
            http_status: error.upstream_status(),
            result: Err(error),
            latency,
            source: FetchSource::Network,
        }
    }

    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.result.as_ref().err()
    }
}

/// How a whole call went, for mapping onto a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    AllSucceeded,
    Partial,
    AllFailed(FailureClass),
}

#[derive(Debug, Clone)]
pub struct AggregateResult {
    /// One outcome per input target, in input order.
    pub outcomes: Vec<FetchOutcome>,
    pub success: bool,
}

impl AggregateResult {
    #[must_use]
    pub fn new(outcomes: Vec<FetchOutcome>) -> Self {
        let success = outcomes.iter().all(FetchOutcome::is_success);
        Self { outcomes, success }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// A deadline anywhere outranks other failures; cancellation only counts
    /// when every failure was a cancellation.
    #[must_use]
    pub fn classification(&self) -> AggregateStatus {
        if self.success {
            return AggregateStatus::AllSucceeded;
        }
        if self.succeeded() > 0 {
            return AggregateStatus::Partial;
        }

        let classes: Vec<FailureClass> = self
            .outcomes
            .iter()
            .filter_map(FetchOutcome::error)
            .map(FetchError::class)
            .collect();
        if classes.contains(&FailureClass::DeadlineExceeded) {
            AggregateStatus::AllFailed(FailureClass::DeadlineExceeded)
        } else if classes.iter().all(|c| *c == FailureClass::Cancelled) {
            AggregateStatus::AllFailed(FailureClass::Cancelled)
        } else {
            AggregateStatus::AllFailed(FailureClass::Upstream)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::target::PayloadFormat;

    fn target() -> FetchTarget {
        FetchTarget::parse("http://svc/a", PayloadFormat::Raw).unwrap()
    }

    fn ok() -> FetchOutcome {
        FetchOutcome::fetched(target(), 200, Bytes::from_static(b"{}"), Duration::ZERO)
    }

    fn err(e: FetchError) -> FetchOutcome {
        FetchOutcome::failed(target(), e, Duration::ZERO)
    }

    fn transport() -> FetchError {
        FetchError::Transport {
            message: "refused".into(),
        }
    }

    #[test]
    fn success_iff_every_outcome_succeeded() {
        assert!(AggregateResult::new(vec![ok(), ok()]).success);
        let mixed = AggregateResult::new(vec![ok(), err(transport())]);
        assert!(!mixed.success);
        assert_eq!(mixed.classification(), AggregateStatus::Partial);
        assert_eq!(mixed.succeeded(), 1);
        assert_eq!(mixed.failed(), 1);
    }

    #[test]
    fn deadline_outranks_other_failures() {
        let agg = AggregateResult::new(vec![err(transport()), err(FetchError::DeadlineExceeded)]);
        assert_eq!(
            agg.classification(),
            AggregateStatus::AllFailed(FailureClass::DeadlineExceeded)
        );
    }

    #[test]
    fn cancelled_only_when_all_cancelled() {
        let all = AggregateResult::new(vec![err(FetchError::Cancelled), err(FetchError::Cancelled)]);
        assert_eq!(
            all.classification(),
            AggregateStatus::AllFailed(FailureClass::Cancelled)
        );

        let mixed = AggregateResult::new(vec![err(FetchError::Cancelled), err(transport())]);
        assert_eq!(
            mixed.classification(),
            AggregateStatus::AllFailed(FailureClass::Upstream)
        );
    }

    #[test]
    fn failed_outcome_keeps_upstream_status() {
        let outcome = err(FetchError::UpstreamStatus {
            status: 503,
            body: Bytes::new(),
        });
        assert_eq!(outcome.http_status, Some(503));
        assert!(outcome.payload().is_none());
        assert!(outcome.error().is_some());
    }
}
