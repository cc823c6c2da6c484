// src/cache/mod.rs
//! Persistent, lease-protected, read-through cache for external-call results.
//!
//! Three independent partitions (webpages, search results, LLM completions)
//! share one discipline: look up memory, then disk; on a miss, take the key's
//! lease and make the external call exactly once, whatever the number of
//! concurrent requesters.

mod lease;
mod stats;
mod store;

pub use stats::{CacheStats, KindStats};

use crate::constants::{
    CACHE_MEMORY_ENTRIES, DEFAULT_LEASE_TIMEOUT, DEFAULT_MAX_WORKERS, MAX_LEASE_ATTEMPTS,
};
use crate::error::{AppError, Result};
use crate::model::{CacheEntry, CacheKey, EntryMeta, ResourceKind};
use dashmap::DashMap;
use lease::{Acquired, LeaseState, LeaseTable, SlotKey};
use lru::LruCache;
use parking_lot::Mutex;
use stats::{Counter, Counters};
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::{DiskStore, Publish};

/// Tunables fixed for the lifetime of an open cache.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// How long a lease holder may take before its lease expires
    pub lease_timeout: Duration,
    /// In-flight leases at which `wait_for_capacity` starts blocking
    pub capacity: usize,
    pub memory_entries: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            capacity: DEFAULT_MAX_WORKERS,
            memory_entries: CACHE_MEMORY_ENTRIES,
        }
    }
}

/// Outcome of a plain lookup.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(Arc<CacheEntry>),
    Miss,
    /// The key failed earlier in this run
    Failed(String),
}

/// Outcome of a successful `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Committed,
    /// An identical payload was already committed
    AlreadyPresent,
}

pub struct ResourceCache {
    store: DiskStore,
    memory: Mutex<LruCache<SlotKey, Arc<CacheEntry>>>,
    failed: DashMap<SlotKey, Arc<str>>,
    leases: LeaseTable,
    counters: Counters,
    options: CacheOptions,
}

impl ResourceCache {
    /// Opens (creating if needed) the partitions under `dir`.
    pub async fn open(dir: &Path, options: CacheOptions) -> Result<Self> {
        let store = DiskStore::open(dir).await?;
        let memory_entries =
            NonZeroUsize::new(options.memory_entries).unwrap_or(NonZeroUsize::MIN);
        log::info!(
            "Opened resource cache at {} (lease timeout {:?}, capacity {})",
            dir.display(),
            options.lease_timeout,
            options.capacity
        );
        Ok(Self {
            store,
            memory: Mutex::new(LruCache::new(memory_entries)),
            failed: DashMap::new(),
            leases: LeaseTable::new(MAX_LEASE_ATTEMPTS),
            counters: Counters::default(),
            options,
        })
    }

    pub fn default_dir() -> PathBuf {
        DiskStore::default_dir()
    }

    pub fn dir(&self) -> &Path {
        self.store.root()
    }

    pub async fn get(&self, kind: ResourceKind, key: &CacheKey) -> Result<CacheLookup> {
        let lookup = self.lookup(kind, key).await?;
        match &lookup {
            CacheLookup::Hit(_) => {
                log::debug!("Cache hit: {} {}", kind, key);
                self.counters.bump(kind, Counter::Hit);
            }
            CacheLookup::Miss => {
                log::debug!("Cache miss: {} {}", kind, key);
                self.counters.bump(kind, Counter::Miss);
            }
            CacheLookup::Failed(_) => {}
        }
        Ok(lookup)
    }

    /// Commits `payload` under `key`.
    ///
    /// Re-putting an identical payload is a no-op; a different payload for a
    /// committed key is a `WriteConflict` and leaves the entry untouched.
    pub async fn put(
        &self,
        kind: ResourceKind,
        key: &CacheKey,
        payload: String,
        meta: EntryMeta,
    ) -> Result<PutOutcome> {
        let (outcome, _) = self.commit(kind, key, payload, meta).await?;
        Ok(outcome)
    }

    /// Read-through access used by every external call site.
    ///
    /// On a miss the caller either takes the key's lease and runs `fetch`, or
    /// waits for the current holder to publish. A fetch error marks the key
    /// failed for the rest of the run; a lease that times out gets one
    /// follow-up attempt before the key is marked failed.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        kind: ResourceKind,
        key: &CacheKey,
        fetch_method: &str,
        mut fetch: F,
    ) -> Result<Arc<CacheEntry>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        loop {
            match self.get(kind, key).await? {
                CacheLookup::Hit(entry) => return Ok(entry),
                CacheLookup::Failed(reason) => return Err(self.key_failed(kind, key, reason)),
                CacheLookup::Miss => {}
            }

            let mut guard = match self.leases.acquire(kind, key) {
                Acquired::Holder(guard) => guard,
                Acquired::Waiter(mut rx) => {
                    log::debug!("Waiting on lease for {} {}", kind, key);
                    let state = match rx.wait_for(|s| !matches!(s, LeaseState::Pending)).await {
                        Ok(state) => state.clone(),
                        Err(_) => LeaseState::Expired,
                    };
                    match state {
                        LeaseState::Ready(entry) => {
                            self.counters.bump(kind, Counter::Hit);
                            return Ok(entry);
                        }
                        LeaseState::Failed(reason) => {
                            return Err(self.key_failed(kind, key, reason.to_string()))
                        }
                        LeaseState::Pending | LeaseState::Expired => continue,
                    }
                }
            };

            // A previous holder may have published between our lookup and
            // acquiring the lease.
            match self.lookup(kind, key).await? {
                CacheLookup::Hit(entry) => {
                    guard.publish(LeaseState::Ready(Arc::clone(&entry)));
                    return Ok(entry);
                }
                CacheLookup::Failed(reason) => {
                    guard.publish(LeaseState::Failed(Arc::from(reason.as_str())));
                    return Err(self.key_failed(kind, key, reason));
                }
                CacheLookup::Miss => {}
            }

            let Some(attempt) = guard.begin_attempt() else {
                let reason = format!("lease expired after {} attempts", MAX_LEASE_ATTEMPTS);
                self.mark_failed(kind, key, &reason);
                guard.publish(LeaseState::Failed(Arc::from(reason.as_str())));
                return Err(AppError::LeaseTimeout {
                    kind,
                    key: key.to_string(),
                    attempts: MAX_LEASE_ATTEMPTS,
                });
            };
            log::debug!(
                "Lease {} acquired for {} {}; calling {}",
                attempt,
                kind,
                key,
                fetch_method
            );
            self.counters.bump(kind, Counter::ExternalCall);
            let started = Instant::now();

            match tokio::time::timeout(self.options.lease_timeout, fetch()).await {
                Ok(Ok(payload)) => {
                    let meta = EntryMeta::new(fetch_method)
                        .with_latency(started.elapsed().as_millis() as u64);
                    match self.commit(kind, key, payload, meta).await {
                        Ok((_, entry)) => {
                            guard.publish(LeaseState::Ready(Arc::clone(&entry)));
                            return Ok(entry);
                        }
                        Err(e) => {
                            let reason = e.failure_reason();
                            self.mark_failed(kind, key, &reason);
                            guard.publish(LeaseState::Failed(Arc::from(reason.as_str())));
                            return Err(e);
                        }
                    }
                }
                Ok(Err(e)) => {
                    let reason = e.failure_reason();
                    log::debug!("{} {} failed: {}", kind, key, reason);
                    self.mark_failed(kind, key, &reason);
                    guard.publish(LeaseState::Failed(Arc::from(reason.as_str())));
                    return Err(e);
                }
                Err(_) if guard.is_last_attempt() => {
                    let attempts = attempt;
                    let reason = format!("lease expired after {} attempts", attempts);
                    log::warn!("Lease on {} {} expired; marking key failed", kind, key);
                    self.mark_failed(kind, key, &reason);
                    guard.publish(LeaseState::Failed(Arc::from(reason.as_str())));
                    return Err(AppError::LeaseTimeout {
                        kind,
                        key: key.to_string(),
                        attempts,
                    });
                }
                Err(_) => {
                    log::warn!(
                        "Lease on {} {} expired after {:?}; allowing one follow-up attempt",
                        kind,
                        key,
                        self.options.lease_timeout
                    );
                    drop(guard);
                }
            }
        }
    }

    /// Resolves once the number of in-flight leases is below capacity.
    pub async fn wait_for_capacity(&self) {
        self.leases.wait_below(self.options.capacity.max(1)).await
    }

    /// Leases currently held.
    pub fn in_flight(&self) -> usize {
        self.leases.in_flight()
    }

    /// Committed entries on disk for a partition.
    pub async fn entry_count(&self, kind: ResourceKind) -> Result<usize> {
        self.store.count(kind).await
    }

    /// Ends the run: forgets per-run failure markers and reports activity.
    pub fn close(&self) -> CacheStats {
        self.failed.clear();
        self.leases.reset();
        let stats = self.counters.snapshot();
        log::info!(
            "Closed resource cache at {} ({} external calls)",
            self.store.root().display(),
            stats.total_external_calls()
        );
        stats
    }

    async fn lookup(&self, kind: ResourceKind, key: &CacheKey) -> Result<CacheLookup> {
        let slot_key = (kind, key.clone());
        let failed = self.failed.get(&slot_key).map(|r| r.to_string());
        if let Some(reason) = failed {
            return Ok(CacheLookup::Failed(reason));
        }
        let cached = self.memory.lock().get(&slot_key).cloned();
        if let Some(entry) = cached {
            return Ok(CacheLookup::Hit(entry));
        }
        match self.store.read(kind, key).await? {
            Some(entry) => {
                let entry = Arc::new(entry);
                self.memory.lock().put(slot_key, Arc::clone(&entry));
                Ok(CacheLookup::Hit(entry))
            }
            None => Ok(CacheLookup::Miss),
        }
    }

    async fn commit(
        &self,
        kind: ResourceKind,
        key: &CacheKey,
        payload: String,
        meta: EntryMeta,
    ) -> Result<(PutOutcome, Arc<CacheEntry>)> {
        let entry = CacheEntry::new(kind, key.clone(), payload, meta);
        let slot_key = (kind, key.clone());

        let existing = self.memory.lock().get(&slot_key).cloned();
        let (outcome, committed) = match existing {
            Some(existing) => (PutOutcome::AlreadyPresent, existing),
            None => match self.store.publish(&entry).await? {
                Publish::Committed => (PutOutcome::Committed, Arc::new(entry.clone())),
                Publish::Existing(existing) => (PutOutcome::AlreadyPresent, Arc::new(existing)),
            },
        };

        if committed.fingerprint != entry.fingerprint {
            self.counters.bump(kind, Counter::Conflict);
            log::error!("Write conflict on {} {}", kind, key);
            return Err(AppError::WriteConflict {
                kind,
                key: key.to_string(),
                committed: committed.fingerprint.clone(),
                attempted: entry.fingerprint,
            });
        }

        self.memory.lock().put(slot_key, Arc::clone(&committed));
        Ok((outcome, committed))
    }

    fn mark_failed(&self, kind: ResourceKind, key: &CacheKey, reason: &str) {
        if self
            .failed
            .insert((kind, key.clone()), Arc::from(reason))
            .is_none()
        {
            self.counters.bump(kind, Counter::FailedKey);
        }
    }

    fn key_failed(&self, kind: ResourceKind, key: &CacheKey, reason: String) -> AppError {
        log::debug!("Serving failed marker for {} {}: {}", kind, key, reason);
        AppError::KeyFailed {
            kind,
            key: key.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn open(dir: &Path) -> ResourceCache {
        ResourceCache::open(dir, CacheOptions::default()).await.unwrap()
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::derive(&[s])
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path()).await;
        let payload = "{\"items\":[]}".to_string();

        let outcome = cache
            .put(
                ResourceKind::SearchResult,
                &key("q"),
                payload.clone(),
                EntryMeta::new("google_cse"),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::Committed);

        match cache.get(ResourceKind::SearchResult, &key("q")).await.unwrap() {
            CacheLookup::Hit(entry) => {
                assert_eq!(entry.payload, payload);
                assert_eq!(entry.fetch_method, "google_cse");
            }
            other => panic!("expected hit, got {:?}", other),
        }
        assert!(matches!(
            cache.get(ResourceKind::Webpage, &key("q")).await.unwrap(),
            CacheLookup::Miss
        ));
    }

    #[tokio::test]
    async fn identical_put_is_idempotent_and_different_put_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path()).await;
        let k = key("page");
        let put = |payload: &str| {
            cache.put(
                ResourceKind::Webpage,
                &k,
                payload.to_string(),
                EntryMeta::new("live_render"),
            )
        };

        assert_eq!(put("a").await.unwrap(), PutOutcome::Committed);
        assert_eq!(put("a").await.unwrap(), PutOutcome::AlreadyPresent);
        assert!(matches!(
            put("b").await.unwrap_err(),
            AppError::WriteConflict { .. }
        ));

        // The committed entry is untouched, also for a fresh process.
        let reopened = open(dir.path()).await;
        match reopened.get(ResourceKind::Webpage, &k).await.unwrap() {
            CacheLookup::Hit(entry) => assert_eq!(entry.payload, "a"),
            other => panic!("expected hit, got {:?}", other),
        }
        assert!(matches!(
            reopened
                .put(ResourceKind::Webpage, &k, "b".to_string(), EntryMeta::new("x"))
                .await
                .unwrap_err(),
            AppError::WriteConflict { .. }
        ));
        assert_eq!(cache.close().kind(ResourceKind::Webpage).conflicts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requesters_share_one_external_call() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(open(dir.path()).await);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(ResourceKind::LlmCompletion, &key("prompt"), "gpt", || {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok("answer".to_string())
                        }
                    })
                    .await
                    .map(|entry| entry.payload.clone())
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "answer");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.close().external_calls(ResourceKind::LlmCompletion), 1);
    }

    #[tokio::test]
    async fn fetch_errors_are_served_as_failed_markers_until_close() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path()).await;
        let calls = AtomicUsize::new(0);
        let failing = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(AppError::internal("upstream down"))
        };

        assert!(cache
            .get_or_fetch(ResourceKind::SearchResult, &key("q"), "google_cse", failing)
            .await
            .is_err());
        let second = cache
            .get_or_fetch(ResourceKind::SearchResult, &key("q"), "google_cse", failing)
            .await
            .unwrap_err();
        assert!(matches!(second, AppError::KeyFailed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.close();
        assert_eq!(stats.kind(ResourceKind::SearchResult).failed_keys, 1);

        // Failures are not persisted: the next run retries.
        assert!(matches!(
            cache.get(ResourceKind::SearchResult, &key("q")).await.unwrap(),
            CacheLookup::Miss
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn lease_timeout_allows_one_follow_up_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResourceCache::open(
            dir.path(),
            CacheOptions {
                lease_timeout: Duration::from_secs(1),
                ..CacheOptions::default()
            },
        )
        .await
        .unwrap();
        let calls = AtomicUsize::new(0);
        let hanging = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".to_string())
        };

        let err = cache
            .get_or_fetch(ResourceKind::Webpage, &key("slow"), "live_render", hanging)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LeaseTimeout { attempts: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let err = cache
            .get_or_fetch(ResourceKind::Webpage, &key("slow"), "live_render", hanging)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::KeyFailed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capacity_wait_blocks_while_leases_are_saturated() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            ResourceCache::open(
                dir.path(),
                CacheOptions {
                    capacity: 1,
                    ..CacheOptions::default()
                },
            )
            .await
            .unwrap(),
        );
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = Arc::new(Mutex::new(Some(release_rx)));

        let holder = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(ResourceKind::Webpage, &key("held"), "live_render", || {
                        let rx = release_rx.lock().take();
                        async move {
                            if let Some(rx) = rx {
                                let _ = rx.await;
                            }
                            Ok("page".to_string())
                        }
                    })
                    .await
            })
        };

        while cache.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), cache.wait_for_capacity()).await;
        assert!(blocked.is_err());

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(1), cache.wait_for_capacity())
            .await
            .unwrap();
    }
}
