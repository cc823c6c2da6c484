// tests/common/mod.rs
//! In-process fakes for the external services plus a harness that wires
//! them into a `CandidatePipeline` over a temporary cache directory.
#![allow(dead_code)]

use parking_lot::Mutex;
use sitecurator::{
    run_cleaning, AppError, ArbitrationOptions, ArchiveReplayer, ArchiveTimestamp, ArchivedPage,
    BackoffPolicy, CacheOptions, CandidatePipeline, Candidate, CleanedRecord, CleaningJob,
    CompletionModel, FetchMode, FetchOptions, FetchStrategySelector, LlmArbitrator, ModelId,
    PageRenderer, RenderedPage, ResourceCache, RunOptions, RunReport, SearchHit, SearchProvider,
    SearchVerifier, Service, ServiceErrorCode, ValidatedUrl, VerifyOptions,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const VERSION_TAG: &str = "v1.1";

/// A document long enough to pass the empty-page check.
pub fn product_page(title: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>{}</body></html>",
        title,
        title,
        "<p>Specifications, dimensions and warranty details.</p>".repeat(12)
    )
}

pub fn hits(urls: &[&str]) -> Vec<SearchHit> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| SearchHit {
            rank: i + 1,
            title: format!("Result {}", i + 1),
            url: url.to_string(),
            snippet: String::new(),
        })
        .collect()
}

pub fn job(brand: &str, product: &str, url: &str) -> CleaningJob {
    CleaningJob::new(
        Candidate::new("headphones", brand, product, url).with_discovery_version("v1.0"),
        VERSION_TAG,
    )
}

fn not_found(service: Service, what: &str) -> AppError {
    AppError::ExternalService {
        service,
        code: ServiceErrorCode::NotFound,
        message: what.to_string(),
    }
}

/// Search results keyed by lowercased query.
#[derive(Default)]
pub struct FakeSearch {
    results: Mutex<HashMap<String, Vec<SearchHit>>>,
    pub calls: AtomicUsize,
}

impl FakeSearch {
    pub fn answer(&self, query: &str, results: Vec<SearchHit>) {
        self.results.lock().insert(query.to_lowercase(), results);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SearchProvider for FakeSearch {
    fn provider_id(&self) -> &str {
        "fake-search"
    }

    async fn search(&self, query: &str, num_results: u8) -> Result<Vec<SearchHit>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let found = self.results.lock().get(&query.to_lowercase()).cloned();
        Ok(found
            .unwrap_or_default()
            .into_iter()
            .take(num_results as usize)
            .collect())
    }
}

/// Live pages keyed by URL; unknown URLs are 404s.
#[derive(Default)]
pub struct FakeRenderer {
    pages: Mutex<HashMap<String, String>>,
    slow: Mutex<HashMap<String, Duration>>,
    delay: Mutex<Duration>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl FakeRenderer {
    pub fn serve(&self, url: &str, html: String) {
        self.pages.lock().insert(url.to_string(), html);
    }

    /// Makes every render of `url` take `delay`.
    pub fn stall(&self, url: &str, delay: Duration) {
        self.slow.lock().insert(url.to_string(), delay);
    }

    /// Delay applied to every render.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, url: &ValidatedUrl) -> Result<RenderedPage, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .slow
            .lock()
            .get(url.as_str())
            .copied()
            .unwrap_or(*self.delay.lock());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let page = self.pages.lock().get(url.as_str()).cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match page {
            Some(html) => Ok(RenderedPage {
                final_url: Some(url.to_string()),
                status: Some(200),
                html,
            }),
            None => Err(not_found(Service::Renderer, url.as_str())),
        }
    }
}

/// Archived captures keyed by URL; unknown URLs have no capture.
#[derive(Default)]
pub struct FakeArchive {
    pages: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
}

impl FakeArchive {
    pub fn serve(&self, url: &str, html: String) {
        self.pages.lock().insert(url.to_string(), html);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ArchiveReplayer for FakeArchive {
    async fn replay(
        &self,
        url: &ValidatedUrl,
        _as_of: Option<&ArchiveTimestamp>,
    ) -> Result<Option<ArchivedPage>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .lock()
            .get(url.as_str())
            .map(|html| ArchivedPage {
                original_url: url.to_string(),
                timestamp: "20240101000000".to_string(),
                html: html.clone(),
            }))
    }
}

/// Answers every prompt mentioning a product with that product's scripted reply.
#[derive(Default)]
pub struct FakeModel {
    replies: Mutex<Vec<(String, String)>>,
    pub calls: AtomicUsize,
}

impl FakeModel {
    pub fn reply(&self, product: &str, answer: &str) {
        self.replies
            .lock()
            .push((product.to_string(), answer.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CompletionModel for FakeModel {
    async fn complete(&self, _model: &ModelId, prompt: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let replies = self.replies.lock();
        Ok(replies
            .iter()
            .find(|(product, _)| prompt.contains(product.as_str()))
            .map(|(_, answer)| answer.clone())
            .unwrap_or_else(|| "none".to_string()))
    }
}

/// Fakes plus a cache directory that outlives individual runs.
pub struct Harness {
    pub cache_dir: TempDir,
    pub search: Arc<FakeSearch>,
    pub renderer: Arc<FakeRenderer>,
    pub archive: Arc<FakeArchive>,
    pub model: Arc<FakeModel>,
    pub fetch_mode: FetchMode,
    pub render_timeout: Duration,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            cache_dir: tempfile::tempdir().expect("temp cache dir"),
            search: Arc::default(),
            renderer: Arc::default(),
            archive: Arc::default(),
            model: Arc::default(),
            fetch_mode: FetchMode::Auto,
            render_timeout: Duration::from_secs(5),
        }
    }

    /// Opens a fresh cache over the harness directory and builds the pipeline.
    pub async fn pipeline(&self) -> (Arc<CandidatePipeline>, Arc<ResourceCache>) {
        let cache = Arc::new(
            ResourceCache::open(self.cache_dir.path(), CacheOptions::default())
                .await
                .expect("cache opens"),
        );
        let retry = BackoffPolicy::immediate(1);

        let verifier = SearchVerifier::new(
            Arc::clone(&cache),
            Arc::clone(&self.search) as Arc<dyn SearchProvider>,
            VerifyOptions {
                num_results: 10,
                timeout: Duration::from_secs(5),
                retry: retry.clone(),
            },
        );
        let arbitrator = LlmArbitrator::new(
            Arc::clone(&cache),
            Arc::clone(&self.model) as Arc<dyn CompletionModel>,
            ArbitrationOptions {
                model: ModelId::new("test-model").expect("valid model id"),
                timeout: Duration::from_secs(5),
                retry: retry.clone(),
            },
        )
        .expect("prompt template registers");
        let fetcher = FetchStrategySelector::new(
            Arc::clone(&cache),
            Some(Arc::clone(&self.renderer) as Arc<dyn PageRenderer>),
            Arc::clone(&self.archive) as Arc<dyn ArchiveReplayer>,
            FetchOptions {
                mode: self.fetch_mode,
                render_timeout: self.render_timeout,
                archive_timeout: Duration::from_secs(5),
                archive_as_of: None,
                retry,
            },
        );

        (
            Arc::new(CandidatePipeline::new(verifier, arbitrator, fetcher)),
            cache,
        )
    }

    pub async fn run(&self, jobs: Vec<CleaningJob>, options: RunOptions) -> RunReport {
        let (pipeline, cache) = self.pipeline().await;
        let mut sink: Vec<CleanedRecord> = Vec::new();
        run_cleaning(pipeline, cache, jobs, options, &mut sink)
            .await
            .expect("run completes")
    }

    pub fn total_calls(&self) -> usize {
        self.search.calls() + self.renderer.calls() + self.archive.calls() + self.model.calls()
    }
}

/// Records sorted by candidate key, for order-independent comparison.
pub fn sorted(mut records: Vec<CleanedRecord>) -> Vec<CleanedRecord> {
    records.sort_by_key(|r| r.key());
    records
}
