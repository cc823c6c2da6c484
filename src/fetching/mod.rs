// src/fetching/mod.rs
//! Page retrieval by live rendering or archival replay, with fallback.
//!
//! One policy function decides which methods are tried and in which order;
//! every attempt goes through the resource cache under a key derived from
//! the normalized URL and the method, and every attempt is recorded.
//!
//! A method's terminal failure (timeout, bad page, missing capture) is
//! committed to the cache like a capture, so a later run replays it instead
//! of calling the service again. Service errors stay per-run failures.

mod document;

pub use document::{check_document, extract_text, is_pdf};

use crate::api::{with_timeout, ArchiveReplayer, PageRenderer};
use crate::cache::ResourceCache;
use crate::constants::{DEFAULT_ARCHIVE_TIMEOUT, DEFAULT_RENDER_TIMEOUT};
use crate::error::{AppError, FetchFailure, Result};
use crate::error_recovery::{retry_with_backoff, BackoffPolicy};
use crate::model::{
    AttemptOutcome, CacheKey, FetchAttempt, FetchMethod, PageCapture, ReasonCode, ResourceKind,
    StoredPage,
};
use crate::types::{ArchiveTimestamp, NormalizedUrl, ValidatedUrl};
use clap::ValueEnum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which fetch methods a run may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Live rendering, falling back to archival replay
    #[default]
    Auto,
    LiveOnly,
    /// Reproducibility mode: archived captures only
    ArchivalOnly,
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::LiveOnly => write!(f, "live_only"),
            Self::ArchivalOnly => write!(f, "archival_only"),
        }
    }
}

/// The ordered fetch methods for a mode.
pub fn fetch_plan(mode: FetchMode) -> &'static [FetchMethod] {
    match mode {
        FetchMode::Auto => &[FetchMethod::LiveRender, FetchMethod::ArchivalReplay],
        FetchMode::LiveOnly => &[FetchMethod::LiveRender],
        FetchMode::ArchivalOnly => &[FetchMethod::ArchivalReplay],
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub mode: FetchMode,
    pub render_timeout: Duration,
    pub archive_timeout: Duration,
    /// Pin for archival replay; latest capture when absent
    pub archive_as_of: Option<ArchiveTimestamp>,
    pub retry: BackoffPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            mode: FetchMode::Auto,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            archive_timeout: DEFAULT_ARCHIVE_TIMEOUT,
            archive_as_of: None,
            retry: BackoffPolicy::default(),
        }
    }
}

/// A successfully retrieved page and the cache entry holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub key: CacheKey,
    pub capture: PageCapture,
}

/// Everything one fetch produced: the page, if any, and every attempt made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub page: Option<FetchedPage>,
    pub attempts: Vec<FetchAttempt>,
    /// Causes of the failed attempts, in attempt order
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn succeeded(&self) -> bool {
        self.page.is_some()
    }

    pub fn method(&self) -> Option<FetchMethod> {
        self.page.as_ref().map(|p| p.capture.method)
    }

    /// Reason recorded when no method produced a page.
    pub fn failure_reason(&self) -> ReasonCode {
        let unavailable = self
            .failures
            .iter()
            .any(|f| matches!(f, FetchFailure::Unavailable(_)));
        if unavailable {
            ReasonCode::ProductUnavailable
        } else {
            ReasonCode::FetchFailed
        }
    }

    fn record(
        &mut self,
        method: FetchMethod,
        url: &ValidatedUrl,
        outcome: AttemptOutcome,
        latency_ms: u64,
    ) {
        self.attempts.push(FetchAttempt {
            method,
            url: url.to_string(),
            outcome,
            latency_ms,
        });
    }

    fn record_failure(
        &mut self,
        method: FetchMethod,
        url: &ValidatedUrl,
        cause: FetchFailure,
        latency_ms: u64,
    ) {
        self.record(method, url, AttemptOutcome::Failed(cause.to_string()), latency_ms);
        self.failures.push(cause);
    }
}

pub struct FetchStrategySelector {
    cache: Arc<ResourceCache>,
    renderer: Option<Arc<dyn PageRenderer>>,
    archive: Arc<dyn ArchiveReplayer>,
    options: FetchOptions,
}

impl FetchStrategySelector {
    pub fn new(
        cache: Arc<ResourceCache>,
        renderer: Option<Arc<dyn PageRenderer>>,
        archive: Arc<dyn ArchiveReplayer>,
        options: FetchOptions,
    ) -> Self {
        Self {
            cache,
            renderer,
            archive,
            options,
        }
    }

    /// Cache key of the page for `url` retrieved by `method`.
    pub fn page_key(&self, url: &ValidatedUrl, method: FetchMethod) -> CacheKey {
        let normalized = NormalizedUrl::from_url(url);
        match (method, &self.options.archive_as_of) {
            (FetchMethod::ArchivalReplay, Some(as_of)) => {
                CacheKey::derive(&[normalized.as_str(), method.as_str(), &as_of.as_compact()])
            }
            _ => CacheKey::derive(&[normalized.as_str(), method.as_str()]),
        }
    }

    /// Retrieves `url`, trying each planned method until one yields a usable page.
    pub async fn fetch(&self, url: &ValidatedUrl) -> FetchReport {
        let plan = fetch_plan(self.options.mode);
        let mut report = FetchReport::default();

        if is_pdf(url.as_url()) {
            log::info!("Not fetching {}: PDF documents are not product pages", url);
            report.record_failure(
                plan[0],
                url,
                FetchFailure::Navigation("pdf document".to_string()),
                0,
            );
            return report;
        }

        for &method in plan {
            let key = self.page_key(url, method);
            // Set by this worker's own call, never by time spent waiting on
            // another worker's lease.
            let call_started: Mutex<Option<Instant>> = Mutex::new(None);
            let result = self
                .cache
                .get_or_fetch(ResourceKind::Webpage, &key, method.as_str(), || {
                    *call_started.lock() = Some(Instant::now());
                    self.retrieve(method, url)
                })
                .await
                .and_then(|entry| {
                    let stored: StoredPage = serde_json::from_str(&entry.payload)?;
                    Ok((entry.latency_ms, stored))
                });

            match result {
                Ok((latency_ms, StoredPage::Captured(capture))) => {
                    log::debug!("Fetched {} via {} ({} ms)", url, method, latency_ms);
                    report.record(method, url, AttemptOutcome::Fetched, latency_ms);
                    report.page = Some(FetchedPage { key, capture });
                    return report;
                }
                Ok((latency_ms, StoredPage::Failed { cause })) => {
                    log::info!("{} via {} failed: {}", url, method, cause);
                    report.record_failure(method, url, cause, latency_ms);
                }
                Err(e) => {
                    let reason = e.failure_reason();
                    log::info!("{} via {} failed: {}", url, method, reason);
                    let started = *call_started.lock();
                    let latency_ms = started
                        .map(|started| started.elapsed().as_millis() as u64)
                        .unwrap_or(0);
                    report.record(method, url, AttemptOutcome::Failed(reason.clone()), latency_ms);
                    report.failures.push(match e {
                        AppError::FetchFailed { cause, .. } => cause,
                        _ => FetchFailure::Service(reason),
                    });
                }
            }
        }

        report
    }

    /// Performs one method's external call and serializes what the cache
    /// should keep: the capture, or a terminal failure.
    async fn retrieve(&self, method: FetchMethod, url: &ValidatedUrl) -> Result<String> {
        let outcome = match method {
            FetchMethod::LiveRender => self.render(url).await,
            FetchMethod::ArchivalReplay => self.replay(url).await,
        };
        let stored = match outcome {
            Ok(capture) => StoredPage::Captured(capture),
            Err(AppError::FetchFailed { cause, .. }) if cause.is_terminal() => {
                StoredPage::Failed { cause }
            }
            Err(e) => return Err(e),
        };
        Ok(serde_json::to_string(&stored)?)
    }

    async fn render(&self, url: &ValidatedUrl) -> Result<PageCapture> {
        let method = FetchMethod::LiveRender;
        let Some(renderer) = &self.renderer else {
            return Err(fetch_failed(
                method,
                FetchFailure::Service("live renderer not configured".to_string()),
            ));
        };

        let timeout = self.options.render_timeout;
        let page = retry_with_backoff("live_render", &self.options.retry, || {
            with_timeout("live_render", timeout, renderer.render(url))
        })
        .await
        .map_err(|e| classify_call_error(method, e))?;

        if let Some(status) = page.status.filter(|s| *s >= 400) {
            return Err(fetch_failed(
                method,
                FetchFailure::Navigation(format!("HTTP {}", status)),
            ));
        }
        check_document(&page.html).map_err(|cause| fetch_failed(method, cause))?;

        Ok(PageCapture {
            requested_url: url.to_string(),
            final_url: page.final_url.unwrap_or_else(|| url.to_string()),
            method,
            html: page.html,
            captured_at: None,
        })
    }

    async fn replay(&self, url: &ValidatedUrl) -> Result<PageCapture> {
        let method = FetchMethod::ArchivalReplay;
        let timeout = self.options.archive_timeout;
        let as_of = self.options.archive_as_of.as_ref();

        let archived = retry_with_backoff("archival_replay", &self.options.retry, || {
            with_timeout("archival_replay", timeout, self.archive.replay(url, as_of))
        })
        .await
        .map_err(|e| classify_call_error(method, e))?
        .ok_or_else(|| fetch_failed(method, FetchFailure::NoCapture))?;

        check_document(&archived.html).map_err(|cause| fetch_failed(method, cause))?;

        Ok(PageCapture {
            requested_url: url.to_string(),
            final_url: archived.original_url,
            method,
            html: archived.html,
            captured_at: Some(archived.timestamp),
        })
    }
}

fn fetch_failed(method: FetchMethod, cause: FetchFailure) -> AppError {
    AppError::FetchFailed { method, cause }
}

/// Maps a service call error onto the fetch failure vocabulary.
fn classify_call_error(method: FetchMethod, error: AppError) -> AppError {
    let cause = if error.is_timeout() {
        FetchFailure::Timeout
    } else {
        match error {
            AppError::ExternalService {
                code: crate::error::ServiceErrorCode::NotFound,
                ..
            } => FetchFailure::Navigation("not found".to_string()),
            other => FetchFailure::Service(other.to_string()),
        }
    };
    fetch_failed(method, cause)
}
