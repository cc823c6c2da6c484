// src/api/mod.rs
//! External services: web search, live rendering, archival replay and LLM
//! completions.
//!
//! The pipeline depends on the traits below, never on HTTP details. Each
//! trait has one concrete HTTP client; tests substitute in-process fakes.

mod browserless;
mod connection_pool;
mod google_search;
mod openai;
mod wayback;

pub use browserless::BrowserlessRenderer;
pub use google_search::GoogleSearch;
pub use openai::OpenAiCompletions;
pub use wayback::WaybackReplayer;

use crate::error::{AppError, Result};
use crate::model::SearchHit;
use crate::types::{ArchiveTimestamp, ModelId, ValidatedUrl};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The ability to run a web search.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    /// Stable identifier, part of search cache keys.
    fn provider_id(&self) -> &str;

    /// Top `num_results` organic results, in rank order.
    async fn search(&self, query: &str, num_results: u8) -> Result<Vec<SearchHit>>;
}

/// A page as rendered by a headless browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// URL after redirects, when the renderer reports it
    pub final_url: Option<String>,
    /// HTTP status of the page itself, when the renderer reports it
    pub status: Option<u16>,
    pub html: String,
}

/// The ability to drive a headless browser to a URL.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &ValidatedUrl) -> Result<RenderedPage>;
}

/// A capture retrieved from a web archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedPage {
    /// The URL as originally captured
    pub original_url: String,
    /// Capture timestamp, `YYYYMMDDhhmmss`
    pub timestamp: String,
    pub html: String,
}

/// The ability to retrieve the nearest archived capture of a URL.
#[async_trait::async_trait]
pub trait ArchiveReplayer: Send + Sync {
    /// `Ok(None)` when the archive holds no usable capture.
    async fn replay(
        &self,
        url: &ValidatedUrl,
        as_of: Option<&ArchiveTimestamp>,
    ) -> Result<Option<ArchivedPage>>;
}

/// The ability to complete a prompt with a language model.
#[async_trait::async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, model: &ModelId, prompt: &str) -> Result<String>;
}

/// Every external service a cleaning run talks to.
#[derive(Clone)]
pub struct Services {
    pub search: Arc<dyn SearchProvider>,
    /// Absent when live rendering is disabled
    pub renderer: Option<Arc<dyn PageRenderer>>,
    pub archive: Arc<dyn ArchiveReplayer>,
    pub llm: Arc<dyn CompletionModel>,
}

/// Bounds a single external call, turning elapsed time into `AppError::Timeout`.
pub async fn with_timeout<T, Fut>(operation: &str, after: Duration, call: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}

/// Reads a response body, failing with a typed service error on non-success.
pub(crate) async fn success_text(
    service: crate::error::Service,
    response: reqwest::Response,
) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AppError::from_status(service, status, &body));
    }
    Ok(body)
}
