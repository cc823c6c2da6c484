// src/model/record.rs
//! Verification results and the final cleaned record.

use super::candidate::{Candidate, CandidateKey};
use super::page::FetchAttempt;
use super::resource::{CacheKey, FetchMethod};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How well a search result corroborates a proposed URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationConfidence {
    Exact,
    DomainMatch,
    NoMatch,
}

/// Output of the search verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub candidate: CandidateKey,
    /// Present exactly when `confidence` is not `NoMatch`
    pub resolved_url: Option<String>,
    pub confidence: VerificationConfidence,
    /// Set when a search failure was folded into `NoMatch`
    pub reason: Option<ReasonCode>,
}

impl VerificationResult {
    pub fn no_match(candidate: CandidateKey, reason: Option<ReasonCode>) -> Self {
        Self {
            candidate,
            resolved_url: None,
            confidence: VerificationConfidence::NoMatch,
            reason,
        }
    }
}

/// Final confidence of a cleaned record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Exact,
    DomainMatch,
    #[serde(rename = "Resolved-by-LLM")]
    ResolvedByLlm,
    Unresolved,
    Failed,
}

impl Confidence {
    pub const ALL: [Confidence; 5] = [
        Confidence::Exact,
        Confidence::DomainMatch,
        Confidence::ResolvedByLlm,
        Confidence::Unresolved,
        Confidence::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "Exact",
            Self::DomainMatch => "DomainMatch",
            Self::ResolvedByLlm => "Resolved-by-LLM",
            Self::Unresolved => "Unresolved",
            Self::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<VerificationConfidence> for Confidence {
    fn from(value: VerificationConfidence) -> Self {
        match value {
            VerificationConfidence::Exact => Self::Exact,
            VerificationConfidence::DomainMatch => Self::DomainMatch,
            VerificationConfidence::NoMatch => Self::Unresolved,
        }
    }
}

/// Machine-readable explanation attached to non-happy-path records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    SearchFailed,
    NoSearchResults,
    ArbitrationNoneMatch,
    ArbitrationFailed,
    ArbitrationInvalidResponse,
    FetchFailed,
    /// The page says the product is discontinued or unavailable
    ProductUnavailable,
    /// Another record of the category kept the same final URL
    DuplicateUrl,
    InvalidCandidate,
    CacheError,
    TaskPanicked,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 11] = [
        ReasonCode::SearchFailed,
        ReasonCode::NoSearchResults,
        ReasonCode::ArbitrationNoneMatch,
        ReasonCode::ArbitrationFailed,
        ReasonCode::ArbitrationInvalidResponse,
        ReasonCode::FetchFailed,
        ReasonCode::ProductUnavailable,
        ReasonCode::DuplicateUrl,
        ReasonCode::InvalidCandidate,
        ReasonCode::CacheError,
        ReasonCode::TaskPanicked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchFailed => "search_failed",
            Self::NoSearchResults => "no_search_results",
            Self::ArbitrationNoneMatch => "arbitration_none_match",
            Self::ArbitrationFailed => "arbitration_failed",
            Self::ArbitrationInvalidResponse => "arbitration_invalid_response",
            Self::FetchFailed => "fetch_failed",
            Self::ProductUnavailable => "product_unavailable",
            Self::DuplicateUrl => "duplicate_url",
            Self::InvalidCandidate => "invalid_candidate",
            Self::CacheError => "cache_error",
            Self::TaskPanicked => "task_panicked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the page behind `final_url` was retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Fetched,
    Failed,
    /// No URL to fetch
    Skipped,
}

/// The single outcome recorded for a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub category: String,
    pub brand: String,
    pub product: String,
    pub final_url: Option<String>,
    pub confidence: Confidence,
    pub fetch_method: Option<FetchMethod>,
    pub fetch_status: FetchStatus,
    pub page_payload_ref: Option<CacheKey>,
    #[serde(default)]
    pub fetch_attempts: Vec<FetchAttempt>,
    pub reason: Option<ReasonCode>,
    pub version_tag: String,
}

impl CleanedRecord {
    /// A record with no URL and nothing fetched.
    pub fn without_url(
        candidate: &Candidate,
        confidence: Confidence,
        reason: Option<ReasonCode>,
        version_tag: &str,
    ) -> Self {
        Self {
            category: candidate.category.clone(),
            brand: candidate.brand.clone(),
            product: candidate.product.clone(),
            final_url: None,
            confidence,
            fetch_method: None,
            fetch_status: FetchStatus::Skipped,
            page_payload_ref: None,
            fetch_attempts: Vec::new(),
            reason,
            version_tag: version_tag.to_string(),
        }
    }

    pub fn failed(candidate: &Candidate, reason: ReasonCode, version_tag: &str) -> Self {
        Self::without_url(candidate, Confidence::Failed, Some(reason), version_tag)
    }

    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            category: self.category.clone(),
            brand: self.brand.clone(),
            product: self.product.clone(),
        }
    }

    /// Whether the record ended with a usable URL.
    pub fn is_resolved(&self) -> bool {
        self.final_url.is_some()
            && matches!(
                self.confidence,
                Confidence::Exact | Confidence::DomainMatch | Confidence::ResolvedByLlm
            )
    }

    /// Counts toward the run's failure threshold.
    pub fn is_failure(&self) -> bool {
        matches!(self.confidence, Confidence::Unresolved | Confidence::Failed)
            || self.fetch_status == FetchStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate::new("headphones", "Acme", "Widget Pro", "https://acme.com/widget")
    }

    #[test]
    fn confidence_labels_round_trip() {
        for c in Confidence::ALL {
            assert_eq!(Confidence::parse(c.as_str()), Some(c));
        }
        assert_eq!(Confidence::ResolvedByLlm.to_string(), "Resolved-by-LLM");
        assert_eq!(
            serde_json::to_string(&Confidence::ResolvedByLlm).unwrap(),
            "\"Resolved-by-LLM\""
        );
    }

    #[test]
    fn reason_codes_serialize_as_snake_case() {
        for r in ReasonCode::ALL {
            assert_eq!(
                serde_json::to_string(&r).unwrap(),
                format!("\"{}\"", r.as_str())
            );
        }
    }

    #[test]
    fn failed_records_carry_no_url() {
        let record = CleanedRecord::failed(&candidate(), ReasonCode::InvalidCandidate, "v1.1");
        assert_eq!(record.final_url, None);
        assert_eq!(record.confidence, Confidence::Failed);
        assert_eq!(record.fetch_status, FetchStatus::Skipped);
        assert!(record.is_failure());
    }

    #[test]
    fn fetch_failure_counts_even_with_a_url() {
        let mut record =
            CleanedRecord::without_url(&candidate(), Confidence::Exact, None, "v1.1");
        record.final_url = Some("https://acme.com/widget".to_string());
        assert!(!record.is_failure());
        record.fetch_status = FetchStatus::Failed;
        assert!(record.is_failure());
    }
}
