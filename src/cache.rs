//! Time-bounded response cache keyed by fetch fingerprint.
//!
//! Reads take a shared lock and never mutate: an expired entry reads as a
//! miss and stays in place until the sweeper removes it. Writes (`set`,
//! sweep deletions) take the exclusive lock, so no reader observes a
//! half-written entry.
//!
//! The sweeper is a single background task per cache, stopped through its
//! [`SweeperHandle`]. It holds only a weak reference, so it also winds down
//! on its own once the cache is gone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reserved key for the health probe round-trip. Fingerprints are 64 hex
/// characters, so this can never shadow a real entry.
const PROBE_KEY: &str = "__fanfetch_health_probe__";

struct CacheEntry {
    payload: Bytes,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TtlCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a fresh payload. Counts towards hit/miss statistics.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let found = self.lookup(key);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Store `payload` under `key`, replacing any previous entry and
    /// restarting its lifetime.
    pub fn set(&self, key: impl Into<String>, payload: Bytes) {
        let entry = CacheEntry {
            payload,
            stored_at: Instant::now(),
        };
        self.write().insert(key.into(), entry);
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(ttl, now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Synthetic set/get round-trip used by the health endpoint.
    ///
    /// Does not touch the hit/miss counters.
    pub fn probe(&self) -> Result<(), String> {
        let expected = Bytes::from_static(b"ok");
        self.set(PROBE_KEY, expected.clone());
        match self.lookup(PROBE_KEY) {
            Some(found) if found == expected => Ok(()),
            Some(_) => Err("cache probe read back different data".into()),
            None => Err("cache probe entry not found after write".into()),
        }
    }

    /// Start the periodic sweep, ticking once per TTL.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let token = CancellationToken::new();
        let cache = Arc::downgrade(self);
        let period = self.ttl;
        let stop = token.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    () = stop.cancelled() => {
                        tracing::debug!("cache sweeper stopping");
                        return;
                    }
                    _ = interval.tick() => {}
                }

                let Some(cache) = cache.upgrade() else {
                    tracing::debug!("cache dropped, sweeper exiting");
                    return;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.len(), "swept expired cache entries");
                }
            }
        });

        SweeperHandle {
            token,
            task: Some(task),
        }
    }

    fn lookup(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        self.read()
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| entry.payload.clone())
    }

    // A panic while holding the lock cannot leave an entry half-written
    // (HashMap::insert either completes or doesn't), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner of a running sweep task.
///
/// Dropping the handle signals the task to stop; [`SweeperHandle::stop`]
/// additionally waits for it to finish.
pub struct SweeperHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "cache sweeper task failed");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
