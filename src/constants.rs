// src/constants.rs
//! Domain constants that define the operational boundaries of the system.
//!
//! Each constant is named for the domain concept it constrains. Reading them
//! should tell you how the cleaning run behaves: how wide it fans out, how
//! long it waits on each service, and what it considers a usable page.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Worker pool boundaries
// ---------------------------------------------------------------------------

/// Default number of candidates processed concurrently.
pub const DEFAULT_MAX_WORKERS: usize = 6;

/// Upper bound on pool width. The services behind the pipeline are paid and
/// rate limited; wider pools only trade money for 429s.
pub const MAX_WORKERS_CEILING: usize = 64;

// ---------------------------------------------------------------------------
// Search verification
// ---------------------------------------------------------------------------

/// Number of search results inspected per query (Custom Search returns at most 10).
pub const DEFAULT_SEARCH_RESULTS: u8 = 10;

/// Largest result page the search API accepts.
pub const MAX_SEARCH_RESULTS: u8 = 10;

// ---------------------------------------------------------------------------
// Per-service timeouts
// ---------------------------------------------------------------------------

pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Live rendering may block for seconds waiting on scripts and images.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(45);

pub const DEFAULT_ARCHIVE_TIMEOUT: Duration = Duration::from_secs(45);

pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a lease holder may take to publish before its lease expires.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(120);

/// Lease attempts per key and run: the original plus one follow-up.
pub const MAX_LEASE_ATTEMPTS: u8 = 2;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Attempts per external call, including the first.
pub const RETRY_MAX_ATTEMPTS: u32 = 5;

pub const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);

pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

// ---------------------------------------------------------------------------
// Page heuristics
// ---------------------------------------------------------------------------

/// Pages whose visible text is shorter than this are treated as empty.
pub const MIN_PAGE_TEXT_CHARS: usize = 200;

/// Challenge pages are small; large documents that merely mention a captcha
/// are real pages.
pub const BOT_BLOCK_MAX_DOCUMENT_BYTES: usize = 64 * 1024;

/// Settle delay after the renderer reports images present.
pub const RENDER_SETTLE_DELAY: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Entries kept in the in-memory layer in front of the disk partitions.
pub const CACHE_MEMORY_ENTRIES: usize = 2048;

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Brands each category should end up with when the categories file does not say.
pub const DEFAULT_REQUIRED_BRANDS: usize = 20;

// ---------------------------------------------------------------------------
// Error display
// ---------------------------------------------------------------------------

/// Maximum characters shown when previewing error response bodies.
pub const ERROR_BODY_PREVIEW_LENGTH: usize = 200;
