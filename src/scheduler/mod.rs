// src/scheduler/mod.rs
//! Drives every candidate through the cleaning pipeline under bounded
//! concurrency and collects exactly one record per candidate.

mod task;
mod worker_pool;

pub use task::{CandidatePipeline, CleaningJob};
pub use worker_pool::{Backpressure, PoolSummary, RunControl, TaskOutcome, WorkerPool};

use crate::cache::{CacheStats, ResourceCache};
use crate::constants::DEFAULT_MAX_WORKERS;
use crate::error::{AppError, Result};
use crate::model::{CleanedRecord, Confidence, ReasonCode};
use crate::pipeline::RecordSink;
use crate::types::NormalizedUrl;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub max_workers: usize,
    /// Failures tolerated before the run aborts; unlimited when `None`
    pub max_run_failures: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_run_failures: None,
        }
    }
}

/// Records and accounting of one cleaning run, complete or aborted.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// In completion order
    pub records: Vec<CleanedRecord>,
    pub pool: PoolSummary,
    pub cache: CacheStats,
    pub max_run_failures: Option<usize>,
}

impl RunReport {
    pub fn is_aborted(&self) -> bool {
        self.pool.aborted
    }

    /// The run-level error for an aborted run.
    pub fn abort_error(&self) -> Option<AppError> {
        self.is_aborted().then(|| AppError::RunAborted {
            threshold: self.max_run_failures.unwrap_or_default(),
            failures: self.pool.failures,
        })
    }

    /// Keeps one resolved record per final URL within each category.
    ///
    /// The record with the strongest confidence keeps the URL, ties going
    /// to the first by (brand, product); the others become `Unresolved`
    /// with reason `duplicate_url`. Returns how many records were demoted.
    pub fn mark_duplicate_urls(&mut self) -> usize {
        let mut order: Vec<(String, NormalizedUrl, usize)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_resolved())
            .filter_map(|(i, record)| {
                let url = record.final_url.as_deref().and_then(NormalizedUrl::parse)?;
                Some((record.category.clone(), url, i))
            })
            .collect();
        order.sort_by(|(ca, ua, a), (cb, ub, b)| {
            let (ra, rb) = (&self.records[*a], &self.records[*b]);
            (ca, ua, ra.confidence, &ra.brand, &ra.product)
                .cmp(&(cb, ub, rb.confidence, &rb.brand, &rb.product))
        });

        let mut keepers: HashMap<(String, NormalizedUrl), usize> = HashMap::new();
        let mut demoted = 0;
        for (category, url, i) in order {
            let Some(&kept) = keepers.get(&(category.clone(), url.clone())) else {
                keepers.insert((category, url), i);
                continue;
            };
            log::info!(
                "{} resolves to the same page as {}; marking it duplicate",
                self.records[i].key(),
                self.records[kept].key()
            );
            let record = &mut self.records[i];
            record.confidence = Confidence::Unresolved;
            record.reason = Some(ReasonCode::DuplicateUrl);
            demoted += 1;
        }
        demoted
    }
}

/// Cleans every job's candidate, streaming each record to `sink` as it completes.
///
/// The cache is closed when the run ends, so per-run failure markers do not
/// leak into the next run. An aborted run still returns `Ok` with the
/// records completed so far; only sink errors are returned as errors.
pub async fn run_cleaning(
    pipeline: Arc<CandidatePipeline>,
    cache: Arc<ResourceCache>,
    jobs: Vec<CleaningJob>,
    options: RunOptions,
    sink: &mut dyn RecordSink,
) -> Result<RunReport> {
    let total = jobs.len();
    let control = Arc::new(RunControl::new(options.max_run_failures));
    let pool = WorkerPool::new(options.max_workers, Arc::clone(&control))
        .with_backpressure(Arc::clone(&cache) as Arc<dyn Backpressure>);
    for job in jobs {
        pool.enqueue(job);
    }

    log::info!(
        "Cleaning {} candidates with {} workers",
        total,
        options.max_workers
    );

    let mut records = Vec::with_capacity(total);

    let summary = pool
        .run(
            move |job: CleaningJob| {
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.process(&job).await }
            },
            |job: CleaningJob, _message| job.panicked(),
            |record: CleanedRecord| -> Result<()> {
                sink.append(&record)?;
                records.push(record);
                Ok(())
            },
        )
        .await;

    let cache_stats = cache.close();
    let summary = summary?;
    sink.flush()?;

    if summary.aborted {
        log::error!(
            "Run aborted after {} failures (threshold {}); {} of {} candidates not started",
            summary.failures,
            options.max_run_failures.unwrap_or_default(),
            summary.not_started,
            total
        );
    } else {
        log::info!(
            "Cleaned {} candidates ({} failures)",
            summary.completed,
            summary.failures
        );
    }

    Ok(RunReport {
        records,
        pool: summary,
        cache: cache_stats,
        max_run_failures: options.max_run_failures,
    })
}
