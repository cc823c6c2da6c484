// src/scheduler/worker_pool.rs
//! Bounded pool of async workers draining a shared FIFO queue.
//!
//! The pool knows nothing about caching or candidates: it pulls items, runs
//! a handler per item, and streams outcomes back to the caller. A shared
//! [`RunControl`] decides when the run stops taking new work.

use crate::cache::ResourceCache;
use crossbeam::deque::{Injector, Steal};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Something workers wait on before taking another item.
#[async_trait::async_trait]
pub trait Backpressure: Send + Sync {
    async fn wait_for_capacity(&self);
}

#[async_trait::async_trait]
impl Backpressure for ResourceCache {
    async fn wait_for_capacity(&self) {
        ResourceCache::wait_for_capacity(self).await
    }
}

/// Classifies a finished item for the run-level failure threshold.
pub trait TaskOutcome {
    fn is_failure(&self) -> bool;
}

/// Abort flag and failure accounting shared by all workers.
#[derive(Debug, Default)]
pub struct RunControl {
    max_failures: Option<usize>,
    failures: AtomicUsize,
    completed: AtomicUsize,
    aborted: AtomicBool,
}

impl RunControl {
    /// `max_failures` of `None` never aborts.
    pub fn new(max_failures: Option<usize>) -> Self {
        Self {
            max_failures,
            ..Self::default()
        }
    }

    /// Counts a finished item. Returns true when this item tripped the
    /// failure threshold.
    pub fn record(&self, failed: bool) -> bool {
        self.completed.fetch_add(1, Ordering::SeqCst);
        if !failed {
            return false;
        }
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        match self.max_failures {
            Some(max) if failures > max => !self.aborted.swap(true, Ordering::SeqCst),
            _ => false,
        }
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_failures(&self) -> Option<usize> {
        self.max_failures
    }
}

/// What a pool run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub completed: usize,
    pub failures: usize,
    /// Items still queued when the run stopped
    pub not_started: usize,
    pub aborted: bool,
}

pub struct WorkerPool<T> {
    injector: Arc<Injector<T>>,
    workers: usize,
    control: Arc<RunControl>,
    backpressure: Option<Arc<dyn Backpressure>>,
}

impl<T> WorkerPool<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(workers: usize, control: Arc<RunControl>) -> Self {
        Self {
            injector: Arc::new(Injector::new()),
            workers: workers.max(1),
            control,
            backpressure: None,
        }
    }

    pub fn with_backpressure(mut self, backpressure: Arc<dyn Backpressure>) -> Self {
        self.backpressure = Some(backpressure);
        self
    }

    pub fn enqueue(&self, item: T) {
        self.injector.push(item);
    }

    pub fn queued(&self) -> usize {
        self.injector.len()
    }

    /// Runs `handler` over every queued item with at most `workers` items in
    /// flight, passing each outcome to `on_result` on the calling task.
    ///
    /// A handler that panics yields `on_panic(item, message)` instead. An
    /// error from `on_result` stops dequeuing; in-flight items still finish
    /// and the first error is returned.
    pub async fn run<R, E, H, Fut, P, S>(
        self,
        handler: H,
        on_panic: P,
        mut on_result: S,
    ) -> Result<PoolSummary, E>
    where
        R: TaskOutcome + Send + 'static,
        H: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        P: Fn(T, String) -> R + Send + Sync + 'static,
        S: FnMut(R) -> Result<(), E>,
    {
        let handler = Arc::new(handler);
        let on_panic = Arc::new(on_panic);
        let (tx, mut rx) = mpsc::unbounded_channel::<R>();
        let mut join_set = JoinSet::new();

        log::debug!(
            "Starting {} workers for {} queued items",
            self.workers,
            self.injector.len()
        );

        for worker_id in 0..self.workers {
            let injector = Arc::clone(&self.injector);
            let control = Arc::clone(&self.control);
            let backpressure = self.backpressure.clone();
            let handler = Arc::clone(&handler);
            let on_panic = Arc::clone(&on_panic);
            let tx = tx.clone();

            join_set.spawn(async move {
                loop {
                    if let Some(backpressure) = &backpressure {
                        backpressure.wait_for_capacity().await;
                    }
                    if control.is_aborted() {
                        break;
                    }
                    let Some(item) = steal(&injector) else {
                        break;
                    };

                    let fallback = item.clone();
                    let outcome = match AssertUnwindSafe(handler(item)).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            log::error!("Worker {} task panicked: {}", worker_id, message);
                            on_panic(fallback, message)
                        }
                    };

                    if control.record(outcome.is_failure()) {
                        log::error!(
                            "Failure threshold exceeded ({} failures); no further items will start",
                            control.failures()
                        );
                    }
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
                log::trace!("Worker {} finished", worker_id);
            });
        }
        drop(tx);

        let mut sink_error = None;
        while let Some(outcome) = rx.recv().await {
            if sink_error.is_some() {
                continue;
            }
            if let Err(e) = on_result(outcome) {
                self.control.abort();
                sink_error = Some(e);
            }
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                log::error!("Worker task ended abnormally: {}", e);
            }
        }

        if let Some(e) = sink_error {
            return Err(e);
        }

        Ok(PoolSummary {
            completed: self.control.completed(),
            failures: self.control.failures(),
            not_started: self.injector.len(),
            aborted: self.control.is_aborted(),
        })
    }
}

fn steal<T>(injector: &Injector<T>) -> Option<T> {
    loop {
        match injector.steal() {
            Steal::Success(item) => return Some(item),
            Steal::Empty => return None,
            Steal::Retry => continue,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Done {
        item: u32,
        failed: bool,
    }

    impl TaskOutcome for Done {
        fn is_failure(&self) -> bool {
            self.failed
        }
    }

    fn pool(items: impl IntoIterator<Item = u32>, workers: usize, max_failures: Option<usize>) -> WorkerPool<u32> {
        let pool = WorkerPool::new(workers, Arc::new(RunControl::new(max_failures)));
        for item in items {
            pool.enqueue(item);
        }
        pool
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_item_produces_one_outcome() {
        let mut seen = Vec::new();
        let summary = pool(0..50, 4, None)
            .run(
                |item| async move { Done { item, failed: false } },
                |item, _| Done { item, failed: true },
                |done: Done| -> Result<(), ()> {
                    seen.push(done.item);
                    Ok(())
                },
            )
            .await
            .unwrap();

        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
        assert_eq!(summary.completed, 50);
        assert_eq!(summary.not_started, 0);
        assert!(!summary.aborted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_items_never_exceed_worker_count() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));

        pool(0..40, 3, None)
            .run(
                move |item| {
                    let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Done { item, failed: false }
                    }
                },
                |item, _| Done { item, failed: true },
                |_: Done| -> Result<(), ()> { Ok(()) },
            )
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn panics_become_fallback_outcomes() {
        let outcomes = Mutex::new(Vec::new());
        pool([1, 2, 3], 1, None)
            .run(
                |item| async move {
                    if item == 2 {
                        panic!("boom on {}", item);
                    }
                    Done { item, failed: false }
                },
                |item, message| {
                    assert!(message.contains("boom on 2"));
                    Done { item, failed: true }
                },
                |done: Done| -> Result<(), ()> {
                    outcomes.lock().push(done);
                    Ok(())
                },
            )
            .await
            .unwrap();

        let outcomes = outcomes.into_inner();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.contains(&Done { item: 2, failed: true }));
    }

    #[tokio::test]
    async fn exceeding_the_failure_threshold_stops_dequeuing() {
        // One worker makes the stopping point deterministic.
        let summary = pool(0..20, 1, Some(5))
            .run(
                |item| async move { Done { item, failed: true } },
                |item, _| Done { item, failed: true },
                |_: Done| -> Result<(), ()> { Ok(()) },
            )
            .await
            .unwrap();

        assert!(summary.aborted);
        assert_eq!(summary.failures, 6);
        assert_eq!(summary.completed, 6);
        assert_eq!(summary.not_started, 14);
    }

    #[tokio::test]
    async fn sink_errors_stop_the_run() {
        let result = pool(0..10, 1, None)
            .run(
                |item| async move { Done { item, failed: false } },
                |item, _| Done { item, failed: true },
                |done: Done| {
                    if done.item == 3 {
                        Err("disk full")
                    } else {
                        Ok(())
                    }
                },
            )
            .await;

        assert_eq!(result, Err("disk full"));
    }

    #[test]
    fn threshold_trips_once() {
        let control = RunControl::new(Some(1));
        assert!(!control.record(true));
        assert!(control.record(true));
        assert!(!control.record(true));
        assert!(control.is_aborted());
        assert_eq!(control.failures(), 3);
    }
}
