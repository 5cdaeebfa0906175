//! Shared deadline and cancellation for one fetch call.
//!
//! Every task spawned for a call holds a clone of the same [`FetchContext`].
//! It is the single source of cancellation: the deadline firing yields
//! [`FetchError::DeadlineExceeded`], the token being cancelled (caller went
//! away, server shutting down) yields [`FetchError::Cancelled`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct FetchContext {
    deadline: Instant,
    token: CancellationToken,
}

impl FetchContext {
    pub const fn new(deadline: Instant, token: CancellationToken) -> Self {
        Self { deadline, token }
    }

    /// A standalone context expiring `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Instant::now() + timeout, CancellationToken::new())
    }

    /// A context whose cancellation follows `parent` (e.g. the server's
    /// shutdown token) and which additionally expires after `timeout`.
    #[must_use]
    pub fn child_of(parent: &CancellationToken, timeout: Duration) -> Self {
        Self::new(Instant::now() + timeout, parent.child_token())
    }

    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The terminal error if the context is already done.
    pub fn error(&self) -> Option<FetchError> {
        if self.token.is_cancelled() {
            Some(FetchError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(FetchError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves once the context is done, with the reason.
    pub async fn done(&self) -> FetchError {
        tokio::select! {
            biased;
            () = self.token.cancelled() => FetchError::Cancelled,
            () = tokio::time::sleep_until(self.deadline) => FetchError::DeadlineExceeded,
        }
    }

    /// Drive `fut` unless the context finishes first, in which case `fut` is
    /// dropped mid-flight.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        if let Some(err) = self.error() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }

    /// Sleep for `delay`, returning early with the context's error if it
    /// finishes first.
    pub async fn sleep(&self, delay: Duration) -> Result<(), FetchError> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
