// src/verification/mod.rs
//! Confirms or repairs a proposed URL against web search evidence.

use crate::api::{with_timeout, SearchProvider};
use crate::cache::ResourceCache;
use crate::constants::{DEFAULT_SEARCH_RESULTS, DEFAULT_SEARCH_TIMEOUT};
use crate::error::Result;
use crate::error_recovery::{retry_with_backoff, BackoffPolicy};
use crate::model::{
    CacheKey, Candidate, ReasonCode, ResourceKind, SearchHit, VerificationConfidence,
    VerificationResult,
};
use crate::types::{
    has_product_path, is_non_official_site, registered_domain, NormalizedUrl, ValidatedUrl,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Results inspected per query
    pub num_results: u8,
    pub timeout: Duration,
    pub retry: BackoffPolicy,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            num_results: DEFAULT_SEARCH_RESULTS,
            timeout: DEFAULT_SEARCH_TIMEOUT,
            retry: BackoffPolicy::default(),
        }
    }
}

/// The verifier's verdict together with the evidence it was based on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub result: VerificationResult,
    /// Search results in rank order; empty when the search failed
    pub hits: Vec<SearchHit>,
}

/// Query text for a product: `"{brand} {product}"`, without repeating a
/// brand the product name already starts with.
pub fn search_query(brand: &str, product: &str) -> String {
    let brand = brand.trim();
    let product = product.trim();
    let starts_with_brand = !brand.is_empty()
        && product
            .to_lowercase()
            .starts_with(&brand.to_lowercase());

    let raw = if starts_with_brand || brand.is_empty() {
        product.to_string()
    } else {
        format!("{} {}", brand, product)
    };
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classifies search results against the proposed URL.
///
/// Exact beats DomainMatch wherever it appears in the list; among domain
/// matches the best-ranked eligible result wins.
pub fn classify(
    proposed: &ValidatedUrl,
    brand: &str,
    hits: &[SearchHit],
) -> (VerificationConfidence, Option<String>) {
    let proposed_normalized = NormalizedUrl::from_url(proposed);
    let proposed_domain = registered_domain(proposed);
    let parsed: Vec<ValidatedUrl> = hits
        .iter()
        .filter_map(|hit| ValidatedUrl::parse(&hit.url).ok())
        .collect();

    if parsed
        .iter()
        .any(|url| NormalizedUrl::from_url(url) == proposed_normalized)
    {
        return (VerificationConfidence::Exact, Some(proposed.to_string()));
    }

    parsed
        .iter()
        .find(|url| {
            registered_domain(url) == proposed_domain
                && has_product_path(url)
                && !is_non_official_site(url, brand)
        })
        .map(|url| (VerificationConfidence::DomainMatch, Some(url.to_string())))
        .unwrap_or((VerificationConfidence::NoMatch, None))
}

pub struct SearchVerifier {
    cache: Arc<ResourceCache>,
    provider: Arc<dyn SearchProvider>,
    options: VerifyOptions,
}

impl SearchVerifier {
    pub fn new(
        cache: Arc<ResourceCache>,
        provider: Arc<dyn SearchProvider>,
        options: VerifyOptions,
    ) -> Self {
        Self {
            cache,
            provider,
            options,
        }
    }

    /// Cache key of a query's result list.
    pub fn search_key(&self, query: &str) -> CacheKey {
        CacheKey::derive(&[
            query.to_lowercase().as_str(),
            self.provider.provider_id(),
            &self.options.num_results.to_string(),
        ])
    }

    /// Runs the (cached) search for a query.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let key = self.search_key(query);
        let provider_id = self.provider.provider_id().to_string();
        let entry = self
            .cache
            .get_or_fetch(ResourceKind::SearchResult, &key, &provider_id, || async {
                let hits = retry_with_backoff("search", &self.options.retry, || {
                    with_timeout(
                        "search",
                        self.options.timeout,
                        self.provider.search(query, self.options.num_results),
                    )
                })
                .await?;
                Ok(serde_json::to_string(&hits)?)
            })
            .await?;
        Ok(serde_json::from_str(&entry.payload)?)
    }

    /// Verifies a candidate's proposed URL.
    ///
    /// A failed search is not an error here: it yields `NoMatch` with the
    /// failure kept as the reason.
    pub async fn verify(&self, candidate: &Candidate, proposed: &ValidatedUrl) -> Verification {
        let query = search_query(&candidate.brand, &candidate.product);

        let hits = match self.search(&query).await {
            Ok(hits) => hits,
            Err(e) => {
                log::warn!("Search for {:?} failed: {}", query, e);
                return Verification {
                    result: VerificationResult::no_match(
                        candidate.key(),
                        Some(ReasonCode::SearchFailed),
                    ),
                    hits: Vec::new(),
                };
            }
        };

        let (confidence, resolved_url) = classify(proposed, &candidate.brand, &hits);
        log::debug!(
            "Verified {} against {} results: {:?}",
            candidate.key(),
            hits.len(),
            confidence
        );

        let reason = hits.is_empty().then_some(ReasonCode::NoSearchResults);
        Verification {
            result: VerificationResult {
                candidate: candidate.key(),
                resolved_url,
                confidence,
                reason,
            },
            hits,
        }
    }
}
