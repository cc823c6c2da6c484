// src/model/mod.rs
//! Domain model: candidates in, cleaned records out, and the cache vocabulary
//! that sits between them.

mod candidate;
mod page;
mod record;
mod resource;

pub use candidate::{Candidate, CandidateKey};
pub use page::{AttemptOutcome, FetchAttempt, PageCapture, SearchHit, StoredPage};
pub use record::{
    CleanedRecord, Confidence, FetchStatus, ReasonCode, VerificationConfidence,
    VerificationResult,
};
pub use resource::{fingerprint, CacheEntry, CacheKey, EntryMeta, FetchMethod, ResourceKind};
