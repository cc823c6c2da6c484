// src/model/page.rs
//! Fetched pages, search hits, and the audit trail of fetch attempts.

use super::resource::FetchMethod;
use crate::error::FetchFailure;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A retrieved document, as stored in the webpage partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCapture {
    pub requested_url: String,
    /// Post-redirect URL (live) or the archived original URL (replay)
    pub final_url: String,
    pub method: FetchMethod,
    pub html: String,
    /// Archive capture timestamp, for replayed pages
    pub captured_at: Option<String>,
}

/// A webpage partition payload: the capture, or the terminal failure of the
/// method that tried to produce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoredPage {
    Captured(PageCapture),
    Failed { cause: FetchFailure },
}

impl StoredPage {
    pub fn capture(&self) -> Option<&PageCapture> {
        match self {
            Self::Captured(capture) => Some(capture),
            Self::Failed { .. } => None,
        }
    }
}

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// 1-based position in the result list
    pub rank: usize,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Outcome of a single fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "cause", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Fetched,
    Failed(String),
}

/// A recorded fetch attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub method: FetchMethod,
    pub url: String,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
}

impl FetchAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Fetched
    }
}

impl fmt::Display for FetchAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Fetched => write!(f, "{}:ok:{}ms", self.method, self.latency_ms),
            AttemptOutcome::Failed(cause) => {
                write!(f, "{}:failed({}):{}ms", self.method, cause, self.latency_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_pages_are_tagged_by_status() {
        let failed = StoredPage::Failed {
            cause: FetchFailure::Timeout,
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert_eq!(json, r#"{"status":"failed","cause":{"kind":"timeout"}}"#);
        assert_eq!(serde_json::from_str::<StoredPage>(&json).unwrap(), failed);

        let captured = StoredPage::Captured(PageCapture {
            requested_url: "https://acme.com/w".to_string(),
            final_url: "https://acme.com/w".to_string(),
            method: FetchMethod::LiveRender,
            html: "<html/>".to_string(),
            captured_at: None,
        });
        let json = serde_json::to_string(&captured).unwrap();
        assert!(json.starts_with(r#"{"status":"captured","requested_url""#));
        assert_eq!(
            serde_json::from_str::<StoredPage>(&json).unwrap().capture(),
            captured.capture()
        );
    }
}
