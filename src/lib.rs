// src/lib.rs
//! sitecurator library: verifies and corrects LLM-proposed product-page URLs.
//!
//! # Public API
//!
//! The library exposes types organized by concern:
//! - **Error handling**: `AppError`, `ValidationError`
//! - **Configuration**: `PipelineConfig`, `CommandLineInput`
//! - **Domain model**: `Candidate`, `CleanedRecord`, `Confidence`, `ReasonCode`
//! - **Services**: the `SearchProvider`, `PageRenderer`, `ArchiveReplayer`
//!   and `CompletionModel` traits with their HTTP clients
//! - **Pipeline stages**: `ResourceCache`, `SearchVerifier`,
//!   `FetchStrategySelector`, `LlmArbitrator`, `CandidatePipeline`
//! - **Running**: `WorkerPool`, `run_cleaning`
//! - **Input and output**: dataset loading, journal, snapshot delivery, summary

mod analytics;
mod api;
mod arbitration;

#[cfg(feature = "bench")]
pub mod cache;
#[cfg(not(feature = "bench"))]
mod cache;

mod config;
mod constants;
mod error;
mod error_recovery;
mod fetching;
mod formatting;
mod input;

#[cfg(feature = "bench")]
pub mod model;
#[cfg(not(feature = "bench"))]
mod model;

mod output;
mod pipeline;
mod scheduler;

#[cfg(feature = "bench")]
pub mod types;
#[cfg(not(feature = "bench"))]
mod types;

mod verification;

// --- Error Handling ---
pub use crate::error::{AppError, FetchFailure, Service, ServiceErrorCode};
pub use crate::types::ValidationError;

// --- Configuration ---
pub use crate::config::{CommandLineInput, Credentials, PipelineConfig};

// --- Domain Model ---
pub use crate::model::{
    AttemptOutcome, CacheEntry, CacheKey, Candidate, CandidateKey, CleanedRecord, Confidence,
    FetchAttempt, FetchMethod, FetchStatus, PageCapture, ReasonCode, ResourceKind, SearchHit,
    VerificationConfidence, VerificationResult,
};

// --- Domain Types ---
pub use crate::types::{
    has_product_path, is_non_official_site, registered_domain, ApiKey, ArchiveTimestamp,
    ModelId, NormalizedUrl, ValidatedUrl,
};

// --- External Services ---
pub use crate::api::{
    ArchiveReplayer, ArchivedPage, BrowserlessRenderer, CompletionModel, GoogleSearch,
    OpenAiCompletions, PageRenderer, RenderedPage, SearchProvider, Services, WaybackReplayer,
};

// --- Pipeline Stages ---
pub use crate::arbitration::{ArbitrationOptions, ArbitrationOutcome, LlmArbitrator};
pub use crate::cache::{CacheLookup, CacheOptions, CacheStats, KindStats, ResourceCache};
pub use crate::error_recovery::BackoffPolicy;
pub use crate::fetching::{FetchMode, FetchOptions, FetchReport, FetchStrategySelector};
pub use crate::verification::{SearchVerifier, Verification, VerifyOptions};

// --- Running ---
pub use crate::scheduler::{
    run_cleaning, CandidatePipeline, CleaningJob, PoolSummary, RunControl, RunOptions,
    RunReport, TaskOutcome, WorkerPool,
};

// --- Input and Output ---
pub use crate::analytics::{CategorySummary, RunSummary};
pub use crate::formatting::{parse_csv, render_snapshot, render_summary, SNAPSHOT_COLUMNS};
pub use crate::input::{
    load_categories, parse_candidates, parse_categories, plan_run, CategoryDataset,
    CategorySpec, DatasetSource, RunPlan,
};
pub use crate::output::{
    deliver, read_journal, DatasetWriter, DeliveryTarget, JournalWriter, OutputPlan,
    OutputReport, SnapshotTarget,
};

// --- Pipeline Traits ---
pub use crate::pipeline::{CandidateSource, RecordSink, SnapshotDelivery};
