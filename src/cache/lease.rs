// src/cache/lease.rs
//! Exclusive per-key leases.
//!
//! The first requester of a missing key installs a lease slot and performs
//! the external call; everyone else subscribes to the slot and waits for the
//! holder to publish. Dropping the guard always releases the slot, so a
//! cancelled or panicking holder surfaces as an expired lease, never a hang.

use crate::model::{CacheEntry, CacheKey, ResourceKind};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

pub(crate) type SlotKey = (ResourceKind, CacheKey);

/// What a lease slot has published so far.
#[derive(Debug, Clone)]
pub(crate) enum LeaseState {
    Pending,
    Ready(Arc<CacheEntry>),
    Failed(Arc<str>),
    /// The holder gave up without a result
    Expired,
}

pub(crate) enum Acquired<'a> {
    Holder(LeaseGuard<'a>),
    Waiter(watch::Receiver<LeaseState>),
}

pub(crate) struct LeaseTable {
    slots: DashMap<SlotKey, Arc<watch::Sender<LeaseState>>>,
    attempts: DashMap<SlotKey, u8>,
    in_flight: AtomicUsize,
    released: Notify,
    max_attempts: u8,
}

impl LeaseTable {
    pub fn new(max_attempts: u8) -> Self {
        Self {
            slots: DashMap::new(),
            attempts: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            released: Notify::new(),
            max_attempts,
        }
    }

    pub fn acquire(&self, kind: ResourceKind, key: &CacheKey) -> Acquired<'_> {
        let slot_key = (kind, key.clone());
        match self.slots.entry(slot_key.clone()) {
            Entry::Occupied(slot) => Acquired::Waiter(slot.get().subscribe()),
            Entry::Vacant(vacant) => {
                let (tx, _) = watch::channel(LeaseState::Pending);
                let tx = Arc::new(tx);
                vacant.insert(Arc::clone(&tx));
                self.in_flight.fetch_add(1, Ordering::SeqCst);

                Acquired::Holder(LeaseGuard {
                    table: self,
                    slot_key,
                    tx,
                    attempt: 0,
                    published: false,
                })
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once fewer than `capacity` leases are held.
    pub async fn wait_below(&self, capacity: usize) {
        loop {
            let released = self.released.notified();
            if self.in_flight() < capacity {
                return;
            }
            released.await;
        }
    }

    /// Forgets lease attempt counts at the end of a run.
    pub fn reset(&self) {
        self.attempts.clear();
    }
}

/// Proof of holding the lease on one key.
pub(crate) struct LeaseGuard<'a> {
    table: &'a LeaseTable,
    slot_key: SlotKey,
    tx: Arc<watch::Sender<LeaseState>>,
    attempt: u8,
    published: bool,
}

impl LeaseGuard<'_> {
    /// Claims the next external-call attempt for this key, if any remain.
    pub fn begin_attempt(&mut self) -> Option<u8> {
        let mut attempts = self.table.attempts.entry(self.slot_key.clone()).or_insert(0);
        if *attempts >= self.table.max_attempts {
            return None;
        }
        *attempts += 1;
        self.attempt = *attempts;
        Some(self.attempt)
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.table.max_attempts
    }

    /// Hands the result to every waiter and releases the lease.
    pub fn publish(mut self, state: LeaseState) {
        self.tx.send_replace(state);
        self.published = true;
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.tx.send_replace(LeaseState::Expired);
        }
        self.table.slots.remove(&self.slot_key);
        self.table.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.table.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::derive(&["query"])
    }

    #[test]
    fn second_requester_waits_on_the_holder() {
        let table = LeaseTable::new(2);
        let mut holder = match table.acquire(ResourceKind::SearchResult, &key()) {
            Acquired::Holder(guard) => guard,
            _ => panic!("first requester should hold the lease"),
        };
        assert_eq!(holder.begin_attempt(), Some(1));
        assert_eq!(table.in_flight(), 1);

        let mut waiter = match table.acquire(ResourceKind::SearchResult, &key()) {
            Acquired::Waiter(rx) => rx,
            _ => panic!("second requester should wait"),
        };
        holder.publish(LeaseState::Failed(Arc::from("boom")));

        assert!(matches!(&*waiter.borrow_and_update(), LeaseState::Failed(r) if &**r == "boom"));
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn dropped_guard_expires_and_counts_attempts() {
        let table = LeaseTable::new(2);
        let claim = || match table.acquire(ResourceKind::Webpage, &key()) {
            Acquired::Holder(mut guard) => {
                let attempt = guard.begin_attempt();
                (attempt, guard.is_last_attempt())
            }
            Acquired::Waiter(_) => panic!("expected a fresh lease"),
        };

        assert_eq!(claim(), (Some(1), false));
        assert_eq!(claim(), (Some(2), true));
        assert_eq!(claim().0, None);

        table.reset();
        assert_eq!(claim(), (Some(1), false));
    }

    #[test]
    fn kinds_lease_independently() {
        let table = LeaseTable::new(2);
        let _a = table.acquire(ResourceKind::Webpage, &key());
        assert!(matches!(
            table.acquire(ResourceKind::LlmCompletion, &key()),
            Acquired::Holder(_)
        ));
    }
}
