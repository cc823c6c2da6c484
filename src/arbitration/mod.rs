// src/arbitration/mod.rs
//! LLM tie-break for candidates search could not settle.
//!
//! The model sees the brand, the product and the numbered search results and
//! answers with one result or "none". Verdicts are cached under the
//! arbitration inputs with the URL set sorted, and the cached verdict names
//! the chosen URL rather than its position, so the same evidence in a
//! different rank order still resolves to the same page.

mod response;

pub use response::{parse_response, ParsedChoice};

use crate::api::{with_timeout, CompletionModel};
use crate::cache::ResourceCache;
use crate::constants::DEFAULT_LLM_TIMEOUT;
use crate::error::{AppError, Result};
use crate::error_recovery::{retry_with_backoff, BackoffPolicy};
use crate::model::{CacheKey, ResourceKind, SearchHit};
use crate::types::ModelId;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const PROMPT_TEMPLATE_NAME: &str = "arbitration";

const PROMPT_TEMPLATE: &str = "\
You are checking which web page is the official product page for a product.

Brand: {{brand}}
Product: {{product}}

Search results:
{{#each results}}
{{this.rank}}. {{this.title}}
   URL: {{this.url}}
{{#if this.snippet}}   {{this.snippet}}
{{/if}}
{{/each}}

Answer with the number of the result that is the product's page on the brand's own \
website. If none of the results is, answer \"none\". Answer with the number or \"none\" only.
";

#[derive(Debug, Clone)]
pub struct ArbitrationOptions {
    pub model: ModelId,
    pub timeout: Duration,
    pub retry: BackoffPolicy,
}

impl ArbitrationOptions {
    pub fn new(model: ModelId) -> Self {
        Self {
            model,
            timeout: DEFAULT_LLM_TIMEOUT,
            retry: BackoffPolicy::default(),
        }
    }
}

/// How the arbitrator resolved a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbitrationOutcome {
    /// The model picked one of the presented results
    Chosen(SearchHit),
    /// The model said no result matches
    NoneMatch,
    /// There was nothing to present; the model was not asked
    NoCandidates,
    /// The answer named neither a result nor "none"
    InvalidResponse(String),
    /// The model could not be reached after retries
    Failed(String),
}

/// Cached form of a model verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
enum StoredVerdict {
    Chosen { url: String, raw: String },
    NoneMatch { raw: String },
    Invalid { raw: String },
}

pub struct LlmArbitrator {
    cache: Arc<ResourceCache>,
    model: Arc<dyn CompletionModel>,
    templates: Handlebars<'static>,
    options: ArbitrationOptions,
}

impl LlmArbitrator {
    pub fn new(
        cache: Arc<ResourceCache>,
        model: Arc<dyn CompletionModel>,
        options: ArbitrationOptions,
    ) -> Result<Self> {
        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);
        templates
            .register_template_string(PROMPT_TEMPLATE_NAME, PROMPT_TEMPLATE)
            .map_err(|e| AppError::TemplateRenderError {
                name: PROMPT_TEMPLATE_NAME.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            cache,
            model,
            templates,
            options,
        })
    }

    pub fn model_id(&self) -> &ModelId {
        &self.options.model
    }

    /// Cache key over the arbitration inputs: brand, product, the sorted
    /// candidate URL set and the model.
    pub fn arbitration_key(&self, brand: &str, product: &str, hits: &[SearchHit]) -> CacheKey {
        let mut urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
        urls.sort_unstable();
        urls.dedup();

        let mut parts = vec![
            "arbitrate",
            brand,
            product,
            self.options.model.as_str(),
        ];
        parts.extend(urls);
        CacheKey::derive(&parts)
    }

    pub fn render_prompt(&self, brand: &str, product: &str, hits: &[SearchHit]) -> Result<String> {
        let data = json!({
            "brand": brand,
            "product": product,
            "results": hits.iter().enumerate().map(|(i, hit)| json!({
                "rank": i + 1,
                "title": hit.title,
                "url": hit.url,
                "snippet": hit.snippet,
            })).collect::<Vec<_>>(),
        });

        self.templates
            .render(PROMPT_TEMPLATE_NAME, &data)
            .map_err(|e| AppError::TemplateRenderError {
                name: PROMPT_TEMPLATE_NAME.to_string(),
                message: e.to_string(),
            })
    }

    /// Asks the model to pick among `hits` for the given product.
    pub async fn arbitrate(&self, brand: &str, product: &str, hits: &[SearchHit]) -> ArbitrationOutcome {
        if hits.is_empty() {
            log::debug!("Nothing to arbitrate for {} {}", brand, product);
            return ArbitrationOutcome::NoCandidates;
        }

        match self.verdict(brand, product, hits).await {
            Ok(StoredVerdict::Chosen { url, .. }) => hits
                .iter()
                .find(|hit| hit.url == url)
                .cloned()
                .map(ArbitrationOutcome::Chosen)
                .unwrap_or(ArbitrationOutcome::InvalidResponse(url)),
            Ok(StoredVerdict::NoneMatch { .. }) => ArbitrationOutcome::NoneMatch,
            Ok(StoredVerdict::Invalid { raw }) => {
                log::warn!("Unusable arbitration answer for {} {}: {:?}", brand, product, raw);
                ArbitrationOutcome::InvalidResponse(raw)
            }
            Err(e) => {
                log::warn!("Arbitration for {} {} failed: {}", brand, product, e);
                ArbitrationOutcome::Failed(e.failure_reason())
            }
        }
    }

    async fn verdict(&self, brand: &str, product: &str, hits: &[SearchHit]) -> Result<StoredVerdict> {
        let key = self.arbitration_key(brand, product, hits);
        let prompt = self.render_prompt(brand, product, hits)?;
        let model = &self.options.model;

        let entry = self
            .cache
            .get_or_fetch(ResourceKind::LlmCompletion, &key, model.as_str(), || async {
                let raw = retry_with_backoff("arbitration", &self.options.retry, || {
                    with_timeout(
                        "arbitration",
                        self.options.timeout,
                        self.model.complete(model, &prompt),
                    )
                })
                .await?;

                let verdict = match parse_response(&raw, hits) {
                    ParsedChoice::Chosen(index) => StoredVerdict::Chosen {
                        url: hits[index].url.clone(),
                        raw,
                    },
                    ParsedChoice::NoneMatch => StoredVerdict::NoneMatch { raw },
                    ParsedChoice::Invalid => StoredVerdict::Invalid { raw },
                };
                Ok(serde_json::to_string(&verdict)?)
            })
            .await?;

        Ok(serde_json::from_str(&entry.payload)?)
    }
}
