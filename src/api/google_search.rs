// src/api/google_search.rs
//! Google Custom Search JSON API client.

use super::connection_pool::{client_for, PoolConfig};
use super::{success_text, SearchProvider};
use crate::error::{AppError, Result, Service};
use crate::model::SearchHit;
use crate::types::ApiKey;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

pub struct GoogleSearch {
    http: Arc<Client>,
    api_key: ApiKey,
    engine_id: String,
    base_url: String,
}

impl GoogleSearch {
    pub fn new(api_key: ApiKey, engine_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let engine_id = engine_id.into();
        if engine_id.trim().is_empty() {
            return Err(AppError::MissingConfiguration(
                "SEARCH_ENGINE_ID is empty".to_string(),
            ));
        }
        Ok(Self {
            http: client_for("google_cse", &PoolConfig::with_request_timeout(timeout))?,
            api_key,
            engine_id,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait::async_trait]
impl SearchProvider for GoogleSearch {
    fn provider_id(&self) -> &str {
        "google_cse"
    }

    async fn search(&self, query: &str, num_results: u8) -> Result<Vec<SearchHit>> {
        let url = format!("{}/customsearch/v1", self.base_url);
        log::debug!("Search request: {:?} (num={})", query, num_results);

        let num = num_results.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        let body = success_text(Service::Search, response).await?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse {
                service: Service::Search,
                message: e.to_string(),
            })?;

        Ok(parsed
            .items
            .into_iter()
            .take(num_results as usize)
            .enumerate()
            .map(|(i, item)| SearchHit {
                rank: i + 1,
                title: item.title,
                url: item.link,
                snippet: item.snippet,
            })
            .collect())
    }
}
