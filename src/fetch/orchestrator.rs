//! Concurrent fan-out of one call to many targets, fan-in in input order.
//!
//! Cache hits are answered inline. Every miss gets its own task running
//! `retry(breaker(upstream))` under the call's shared [`FetchContext`], and
//! writes its outcome into the slot matching its input position. A failing
//! target never fails the call; it shows up as a failed outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::IgnoredAny;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::breaker::{BreakerRegistry, CircuitBreaker};
use crate::cache::TtlCache;
use crate::error::{DispatchError, FetchError};
use crate::retry::{self, RetryPolicy};

use super::context::FetchContext;
use super::outcome::{AggregateResult, FetchOutcome};
use super::target::{FetchTarget, PayloadFormat};
use super::upstream::{Upstream, UpstreamResponse};

/// How long past the deadline collection waits for tasks to notice it.
const COLLECTION_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub struct FetchStats {
    pub dispatched: AtomicU64,
    pub targets_succeeded: AtomicU64,
    pub targets_failed: AtomicU64,
    pub cache_served: AtomicU64,
}

pub struct Orchestrator {
    cache: Arc<TtlCache>,
    breakers: Arc<BreakerRegistry>,
    upstream: Arc<dyn Upstream>,
    retry: RetryPolicy,
    max_targets: usize,
    stats: FetchStats,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        cache: Arc<TtlCache>,
        breakers: Arc<BreakerRegistry>,
        upstream: Arc<dyn Upstream>,
        retry: RetryPolicy,
        max_targets: usize,
    ) -> Self {
        Self {
            cache,
            breakers,
            upstream,
            retry,
            max_targets,
            stats: FetchStats::default(),
        }
    }

    pub const fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub const fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub const fn stats(&self) -> &FetchStats {
        &self.stats
    }

    pub const fn max_targets(&self) -> usize {
        self.max_targets
    }

    /// Check a target count before any parsing or fetching happens.
    pub const fn validate_count(&self, count: usize) -> Result<(), DispatchError> {
        if count == 0 {
            Err(DispatchError::NoTargets)
        } else if count > self.max_targets {
            Err(DispatchError::TooManyTargets {
                count,
                max: self.max_targets,
            })
        } else {
            Ok(())
        }
    }

    /// Fetch every target concurrently and return their outcomes in input
    /// order.
    ///
    /// Only an empty or oversized target list fails the whole call.
    pub async fn dispatch(
        &self,
        ctx: &FetchContext,
        targets: Vec<FetchTarget>,
    ) -> Result<AggregateResult, DispatchError> {
        self.validate_count(targets.len())?;
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let total = targets.len();
        let mut slots: Vec<Option<FetchOutcome>> = (0..total).map(|_| None).collect();
        let mut pending: Vec<(usize, FetchTarget)> = Vec::new();
        let mut tasks = JoinSet::new();
        let mut cache_hits = 0usize;

        for (idx, target) in targets.into_iter().enumerate() {
            if let Some(payload) = self.cache.get(target.fingerprint()) {
                tracing::debug!(target = %target.url(), "served from cache");
                cache_hits += 1;
                slots[idx] = Some(FetchOutcome::cached(target, payload, started.elapsed()));
                continue;
            }

            let job = FetchJob {
                target: target.clone(),
                ctx: ctx.clone(),
                policy: self.retry,
                cache: Arc::clone(&self.cache),
                breaker: self.breakers.get(target.endpoint()),
                upstream: Arc::clone(&self.upstream),
            };
            pending.push((idx, target));
            tasks.spawn(async move { (idx, job.run().await) });
        }

        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((idx, outcome)) => slots[idx] = Some(outcome),
                    Err(e) => tracing::error!(error = %e, "fetch task did not complete"),
                }
            }
        };
        if tokio::time::timeout_at(ctx.deadline() + COLLECTION_GRACE, collect)
            .await
            .is_err()
        {
            tracing::warn!(
                outstanding = tasks.len(),
                "fetch tasks still running after deadline, aborting"
            );
            tasks.abort_all();
        }

        for (idx, target) in pending {
            if slots[idx].is_none() {
                let error = ctx.error().unwrap_or_else(|| FetchError::Transport {
                    message: "fetch task aborted".into(),
                });
                slots[idx] = Some(FetchOutcome::failed(target, error, started.elapsed()));
            }
        }

        let outcomes: Vec<FetchOutcome> = slots.into_iter().flatten().collect();
        let aggregate = AggregateResult::new(outcomes);

        let succeeded = aggregate.succeeded();
        let failed = aggregate.failed();
        self.stats
            .targets_succeeded
            .fetch_add(succeeded as u64, Ordering::Relaxed);
        self.stats
            .targets_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        self.stats
            .cache_served
            .fetch_add(cache_hits as u64, Ordering::Relaxed);

        tracing::info!(
            targets = total,
            succeeded,
            failed,
            cache_hits,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "dispatch complete"
        );

        Ok(aggregate)
    }
}

/// Everything one spawned fetch task owns.
struct FetchJob {
    target: FetchTarget,
    ctx: FetchContext,
    policy: RetryPolicy,
    cache: Arc<TtlCache>,
    breaker: Arc<CircuitBreaker>,
    upstream: Arc<dyn Upstream>,
}

impl FetchJob {
    async fn run(self) -> FetchOutcome {
        let started = Instant::now();
        let Self {
            target,
            ctx,
            policy,
            cache,
            breaker,
            upstream,
        } = self;

        let result = retry::with_backoff(&ctx, &policy, || {
            breaker.execute(|| attempt(upstream.as_ref(), &target))
        })
        .await;
        let latency = started.elapsed();

        match result {
            Ok(response) => {
                cache.set(target.fingerprint(), response.body.clone());
                tracing::debug!(
                    target = %target.url(),
                    status = response.status,
                    latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    "target fetched"
                );
                FetchOutcome::fetched(target, response.status, response.body, latency)
            }
            Err(error) => {
                tracing::warn!(
                    target = %target.url(),
                    kind = error.kind(),
                    error = %error,
                    latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    "target failed"
                );
                FetchOutcome::failed(target, error, latency)
            }
        }
    }
}

/// One network attempt, including the payload-format check.
async fn attempt(
    upstream: &dyn Upstream,
    target: &FetchTarget,
) -> Result<UpstreamResponse, FetchError> {
    let response = upstream.get(target).await?;
    if target.format() == PayloadFormat::Json {
        if let Err(e) = serde_json::from_slice::<IgnoredAny>(&response.body) {
            return Err(FetchError::Decode {
                message: e.to_string(),
                body: response.body,
            });
        }
    }
    Ok(response)
}
