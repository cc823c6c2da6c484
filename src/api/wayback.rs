// src/api/wayback.rs
//! Archival replay via the Wayback Machine CDX index.
//!
//! The index is asked for the latest HTML capture served with status 200 at
//! or before the pinned timestamp; the capture is then retrieved raw (the
//! `id_` flag) so the archive's toolbar and URL rewriting stay out of the
//! document.

use super::connection_pool::{client_for, PoolConfig};
use super::{success_text, ArchiveReplayer, ArchivedPage};
use crate::error::{AppError, Result, Service};
use crate::types::{ArchiveTimestamp, ValidatedUrl};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://web.archive.org";

pub struct WaybackReplayer {
    http: Arc<Client>,
    base_url: String,
}

impl WaybackReplayer {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: client_for("wayback", &PoolConfig::with_request_timeout(timeout))?,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Latest usable capture at or before `as_of`, as (timestamp, original URL).
    async fn closest_capture(
        &self,
        url: &ValidatedUrl,
        as_of: &ArchiveTimestamp,
    ) -> Result<Option<(String, String)>> {
        let endpoint = format!("{}/cdx/search/cdx", self.base_url);
        let to = as_of.as_compact();
        log::debug!("Archive index lookup: {} (as of {})", url, to);

        let response = self
            .http
            .get(&endpoint)
            .query(&[
                ("url", url.as_str()),
                ("output", "json"),
                ("fl", "timestamp,original"),
                ("filter", "statuscode:200"),
                ("filter", "mimetype:text/html"),
                ("to", to.as_str()),
                ("limit", "-1"),
            ])
            .send()
            .await?;
        let body = success_text(Service::Archive, response).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let rows: Vec<Vec<String>> =
            serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse {
                service: Service::Archive,
                message: e.to_string(),
            })?;

        // The first row is the field header.
        Ok(rows
            .into_iter()
            .skip(1)
            .filter_map(|row| match row.as_slice() {
                [timestamp, original, ..] => Some((timestamp.clone(), original.clone())),
                _ => None,
            })
            .max_by(|a, b| a.0.cmp(&b.0)))
    }
}

#[async_trait::async_trait]
impl ArchiveReplayer for WaybackReplayer {
    async fn replay(
        &self,
        url: &ValidatedUrl,
        as_of: Option<&ArchiveTimestamp>,
    ) -> Result<Option<ArchivedPage>> {
        let as_of = as_of.copied().unwrap_or_else(ArchiveTimestamp::now);
        let Some((timestamp, original_url)) = self.closest_capture(url, &as_of).await? else {
            log::debug!("No archived capture for {}", url);
            return Ok(None);
        };

        let replay_url = format!("{}/web/{}id_/{}", self.base_url, timestamp, original_url);
        log::debug!("Archive replay: {}", replay_url);
        let response = self.http.get(&replay_url).send().await?;
        let html = success_text(Service::Archive, response).await?;

        Ok(Some(ArchivedPage {
            original_url,
            timestamp,
            html,
        }))
    }
}
