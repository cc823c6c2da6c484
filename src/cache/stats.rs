// src/cache/stats.rs
//! Per-partition counters, reported when the cache is closed.

use crate::model::ResourceKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct KindCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    external_calls: AtomicU64,
    conflicts: AtomicU64,
    failed_keys: AtomicU64,
}

#[derive(Default)]
pub(crate) struct Counters {
    kinds: [KindCounters; 3],
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    Hit,
    Miss,
    ExternalCall,
    Conflict,
    FailedKey,
}

impl Counters {
    pub fn bump(&self, kind: ResourceKind, counter: Counter) {
        let c = &self.kinds[slot(kind)];
        let cell = match counter {
            Counter::Hit => &c.hits,
            Counter::Miss => &c.misses,
            Counter::ExternalCall => &c.external_calls,
            Counter::Conflict => &c.conflicts,
            Counter::FailedKey => &c.failed_keys,
        };
        cell.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        let per_kind = ResourceKind::ALL
            .into_iter()
            .map(|kind| {
                let c = &self.kinds[slot(kind)];
                let stats = KindStats {
                    hits: c.hits.load(Ordering::Relaxed),
                    misses: c.misses.load(Ordering::Relaxed),
                    external_calls: c.external_calls.load(Ordering::Relaxed),
                    conflicts: c.conflicts.load(Ordering::Relaxed),
                    failed_keys: c.failed_keys.load(Ordering::Relaxed),
                };
                (kind, stats)
            })
            .collect();
        CacheStats { per_kind }
    }
}

fn slot(kind: ResourceKind) -> usize {
    match kind {
        ResourceKind::Webpage => 0,
        ResourceKind::SearchResult => 1,
        ResourceKind::LlmCompletion => 2,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub hits: u64,
    pub misses: u64,
    pub external_calls: u64,
    pub conflicts: u64,
    pub failed_keys: u64,
}

/// Cache activity over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub per_kind: BTreeMap<ResourceKind, KindStats>,
}

impl CacheStats {
    pub fn kind(&self, kind: ResourceKind) -> KindStats {
        self.per_kind.get(&kind).copied().unwrap_or_default()
    }

    pub fn external_calls(&self, kind: ResourceKind) -> u64 {
        self.kind(kind).external_calls
    }

    pub fn total_external_calls(&self) -> u64 {
        self.per_kind.values().map(|s| s.external_calls).sum()
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .per_kind
            .iter()
            .map(|(kind, s)| {
                format!(
                    "{} {} hits/{} misses/{} calls",
                    kind, s.hits, s.misses, s.external_calls
                )
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}
