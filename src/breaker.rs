//! Per-endpoint circuit breakers.
//!
//! A breaker counts consecutive endpoint failures. Once `failure_threshold`
//! is reached it opens and rejects calls without running them. After the
//! cooldown the next caller becomes the single half-open probe: its success
//! closes the breaker, its failure reopens it with a fresh cooldown.
//!
//! Only [`FetchError::trips_breaker`] failures count against an endpoint.
//! Deadline expiry and cancellation say nothing about the endpoint, so an
//! abandoned probe simply gives its slot back.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Transition and rejection counters, shared by every breaker in a registry.
#[derive(Debug, Default)]
pub struct BreakerStats {
    pub opened: AtomicU64,
    pub half_opened: AtomicU64,
    pub closed: AtomicU64,
    pub rejected: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub endpoint: String,
    pub state: BreakerState,
    pub failures: u32,
    pub since_transition_ms: u64,
}

struct Inner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
    changed_at: Instant,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    endpoint: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    stats: Arc<BreakerStats>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, config: BreakerConfig, stats: Arc<BreakerStats>) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                opened_at: None,
                changed_at: Instant::now(),
                probe_in_flight: false,
            }),
            stats,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            endpoint: self.endpoint.clone(),
            state: inner.state,
            failures: inner.failures,
            since_transition_ms: u64::try_from(inner.changed_at.elapsed().as_millis())
                .unwrap_or(u64::MAX),
        }
    }

    /// Run `operation` if the breaker admits it, and record the outcome.
    ///
    /// A rejected call returns [`FetchError::BreakerOpen`] without invoking
    /// `operation`. Nothing is retried here.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let probe = self.admit()?;
        let guard = ProbeGuard {
            breaker: self,
            armed: probe,
        };

        let result = operation().await;
        match &result {
            Ok(_) | Err(FetchError::Decode { .. }) => guard.settle(Verdict::Healthy),
            Err(e) if e.trips_breaker() => guard.settle(Verdict::Unhealthy),
            // Deadline or cancellation: the guard releases any probe slot.
            Err(_) => drop(guard),
        }
        result
    }

    /// Returns whether the admitted call is the half-open probe.
    fn admit(&self) -> Result<bool, FetchError> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(false),
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cooldown);
                if cooled {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.probe_in_flight = true;
                    Ok(true)
                } else {
                    Err(self.reject())
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(self.reject())
                } else {
                    inner.probe_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    fn record(&self, verdict: Verdict, probe: bool) {
        let mut inner = self.lock();
        match (inner.state, probe) {
            (BreakerState::HalfOpen, true) => {
                inner.probe_in_flight = false;
                match verdict {
                    Verdict::Healthy => self.transition(&mut inner, BreakerState::Closed),
                    Verdict::Unhealthy => {
                        inner.failures = inner.failures.saturating_add(1);
                        self.transition(&mut inner, BreakerState::Open);
                    }
                }
            }
            (BreakerState::Closed, false) => match verdict {
                Verdict::Healthy => inner.failures = 0,
                Verdict::Unhealthy => {
                    inner.failures = inner.failures.saturating_add(1);
                    if inner.failures >= self.config.failure_threshold {
                        self.transition(&mut inner, BreakerState::Open);
                    }
                }
            },
            // Late results from calls admitted before the last transition
            // do not move the state machine.
            _ => {}
        }
    }

    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        let now = Instant::now();
        inner.state = to;
        inner.changed_at = now;

        let counter = match to {
            BreakerState::Open => {
                inner.opened_at = Some(now);
                &self.stats.opened
            }
            BreakerState::HalfOpen => &self.stats.half_opened,
            BreakerState::Closed => {
                inner.failures = 0;
                inner.opened_at = None;
                &self.stats.closed
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if to == BreakerState::Open {
            tracing::warn!(
                endpoint = %self.endpoint,
                from = %from,
                to = %to,
                failures = inner.failures,
                "circuit breaker opened"
            );
        } else {
            tracing::info!(
                endpoint = %self.endpoint,
                from = %from,
                to = %to,
                failures = inner.failures,
                "circuit breaker transition"
            );
        }
    }

    fn reject(&self) -> FetchError {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        FetchError::BreakerOpen {
            endpoint: self.endpoint.clone(),
        }
    }

    // State updates are single assignments, never left half-done by a panic.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Copy)]
enum Verdict {
    Healthy,
    Unhealthy,
}

/// Records the outcome of an admitted call. If dropped without settling
/// (future abandoned, deadline, cancellation) a held probe slot is released.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl ProbeGuard<'_> {
    fn settle(mut self, verdict: Verdict) {
        let probe = std::mem::replace(&mut self.armed, false);
        self.breaker.record(verdict, probe);
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}

/// Process-wide set of breakers keyed by endpoint, created on first use.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: BreakerConfig,
    stats: Arc<BreakerStats>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            stats: Arc::new(BreakerStats::default()),
        }
    }

    #[must_use]
    pub fn get(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(endpoint) {
            return Arc::clone(existing.value());
        }
        self.breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    endpoint,
                    self.config,
                    Arc::clone(&self.stats),
                ))
            })
            .value()
            .clone()
    }

    pub fn stats(&self) -> &BreakerStats {
        &self.stats
    }

    /// Snapshots of every known breaker, sorted by endpoint.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        all.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        all
    }

    pub fn open_count(&self) -> usize {
        self.breakers
            .iter()
            .filter(|entry| entry.value().state() != BreakerState::Closed)
            .count()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use bytes::Bytes;

    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(60);

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "http://svc:80",
            BreakerConfig {
                failure_threshold: 3,
                cooldown: COOLDOWN,
            },
            Arc::new(BreakerStats::default()),
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), FetchError> {
        b.execute(|| async {
            Err(FetchError::UpstreamStatus {
                status: 500,
                body: Bytes::new(),
            })
        })
        .await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<(), FetchError> {
        b.execute(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_consecutive_failures_and_short_circuits() {
        let b = breaker();
        for _ in 0..3 {
            assert!(fail(&b).await.is_err());
        }
        assert_eq!(b.state(), BreakerState::Open);

        let calls = AtomicU32::new(0);
        let err = b
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BreakerOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.stats.rejected.load(Ordering::Relaxed), 1);
        assert_eq!(b.stats.opened.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_count() {
        let b = breaker();
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();
        succeed(&b).await.unwrap();
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.snapshot().failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stays_open_until_cooldown_elapses() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(COOLDOWN - Duration::from_millis(1)).await;
        assert!(matches!(
            succeed(&b).await,
            Err(FetchError::BreakerOpen { .. })
        ));
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_success_closes() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(COOLDOWN).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.snapshot().failures, 0);
        assert_eq!(b.stats.half_opened.load(Ordering::Relaxed), 1);
        assert_eq!(b.stats.closed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_reopens_with_fresh_cooldown() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(COOLDOWN).await;
        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), BreakerState::Open);

        tokio::time::advance(COOLDOWN / 2).await;
        assert!(matches!(
            succeed(&b).await,
            Err(FetchError::BreakerOpen { .. })
        ));
        tokio::time::advance(COOLDOWN / 2).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_single_probe() {
        let b = Arc::new(breaker());
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(COOLDOWN).await;

        let probe = {
            let b = Arc::clone(&b);
            tokio::spawn(async move {
                b.execute(|| async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(())
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(b.state(), BreakerState::HalfOpen);

        assert!(matches!(
            succeed(&b).await,
            Err(FetchError::BreakerOpen { .. })
        ));

        probe.await.unwrap().unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_probe_releases_slot() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(COOLDOWN).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            b.execute(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_and_deadline_do_not_trip() {
        let b = breaker();
        for _ in 0..5 {
            let _ = b
                .execute(|| async {
                    Err::<(), _>(FetchError::Decode {
                        message: "eof".into(),
                        body: bytes::Bytes::new(),
                    })
                })
                .await;
            let _ = b
                .execute(|| async { Err::<(), _>(FetchError::DeadlineExceeded) })
                .await;
        }
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.snapshot().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn never_closes_without_probe_success() {
        // Open -> Closed only ever via HalfOpen.
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        for _ in 0..10 {
            let _ = succeed(&b).await;
            assert_eq!(b.state(), BreakerState::Open);
        }
        assert_eq!(b.stats.closed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn registry_shares_breaker_per_endpoint() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let a = registry.get("http://svc:80");
        let b = registry.get("http://svc:80");
        let c = registry.get("http://other:80");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);

        let endpoints: Vec<_> = registry
            .snapshots()
            .into_iter()
            .map(|s| s.endpoint)
            .collect();
        assert_eq!(endpoints, vec!["http://other:80", "http://svc:80"]);
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&BreakerState::HalfOpen).unwrap(),
            "\"half_open\""
        );
    }
}
