// src/error.rs
//! Application error types with structured error handling.
//!
//! Error types form the vocabulary for failure modes in the system. Each
//! variant says what went wrong and where, so call sites can decide between
//! retrying, falling back, or recording a terminal outcome.

use crate::model::{FetchMethod, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// External services the pipeline pays for or depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Search,
    Renderer,
    Archive,
    Llm,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::Renderer => write!(f, "renderer"),
            Self::Archive => write!(f, "archive"),
            Self::Llm => write!(f, "llm"),
        }
    }
}

/// Service error codes as a typed vocabulary.
///
/// Recovery decisions match on these variants instead of raw status codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceErrorCode {
    /// Quota or rate limit exceeded; back off and retry
    RateLimited,
    /// Credentials missing or invalid
    Unauthorized,
    /// Access refused; Google reports exhausted daily quota this way
    Forbidden,
    /// The requested resource does not exist
    NotFound,
    /// The service failed internally or is temporarily unavailable
    ServerError(u16),
    /// Any other non-success status
    HttpStatus(u16),
}

impl ServiceErrorCode {
    /// Classifies a non-success HTTP status.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 | 410 => Self::NotFound,
            500..=599 => Self::ServerError(status),
            other => Self::HttpStatus(other),
        }
    }

    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Forbidden | Self::ServerError(_)
        )
    }
}

impl fmt::Display for ServiceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::NotFound => write!(f, "not_found"),
            Self::ServerError(code) => write!(f, "server_error_{}", code),
            Self::HttpStatus(code) => write!(f, "http_{}", code),
        }
    }
}

/// Why a single page fetch attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchFailure {
    /// The method-specific timeout elapsed
    Timeout,
    /// The page could not be navigated to (bad status, refused URL, ...)
    Navigation(String),
    /// An anti-automation challenge page was served instead of content
    BotBlocked(String),
    /// The page text was empty or too short to be a product page
    EmptyDocument,
    /// The page says the product is discontinued or unavailable
    Unavailable(String),
    /// The archive holds no usable capture of the URL
    NoCapture,
    /// The service itself failed after retries
    Service(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Navigation(cause) => write!(f, "navigation error: {}", cause),
            Self::BotBlocked(signal) => write!(f, "bot block detected ({})", signal),
            Self::EmptyDocument => write!(f, "empty document"),
            Self::Unavailable(signal) => write!(f, "product unavailable ({})", signal),
            Self::NoCapture => write!(f, "no archived capture"),
            Self::Service(cause) => write!(f, "service error: {}", cause),
        }
    }
}

impl FetchFailure {
    /// Whether the failure describes the page rather than the service, so
    /// later runs may replay it from the cache instead of fetching again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Service(_))
    }
}

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network failure: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    #[error("{service} service returned an error ({code}): {message}")]
    ExternalService {
        service: Service,
        code: ServiceErrorCode,
        message: String,
    },

    #[error("{operation} timed out after {}s", after.as_secs_f32())]
    Timeout { operation: String, after: Duration },

    #[error("Malformed response from {service}: {message}")]
    MalformedResponse { service: Service, message: String },

    #[error("Lease on {kind} key {key} expired after {attempts} attempt(s)")]
    LeaseTimeout {
        kind: ResourceKind,
        key: String,
        attempts: u8,
    },

    #[error("Write conflict on {kind} key {key}: committed fingerprint {committed}, attempted {attempted}")]
    WriteConflict {
        kind: ResourceKind,
        key: String,
        committed: String,
        attempted: String,
    },

    #[error("{kind} key {key} already failed in this run: {reason}")]
    KeyFailed {
        kind: ResourceKind,
        key: String,
        reason: String,
    },

    #[error("Cache entry {path} is corrupted: {message}")]
    CacheCorrupted { path: String, message: String },

    #[error("{method} fetch failed: {cause}")]
    FetchFailed {
        method: FetchMethod,
        cause: FetchFailure,
    },

    #[error("Run aborted: {failures} failed candidates exceeded the threshold of {threshold}")]
    RunAborted { threshold: usize, failures: usize },

    #[error("Delivery failed: {}", failures.join("; "))]
    DeliveryFailed { failures: Vec<String> },

    #[error("Filesystem IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template render error for template {name}: {message}")]
    TemplateRenderError { name: String, message: String },

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(transparent)]
    ValidationError(#[from] crate::types::ValidationError),
}

impl AppError {
    /// Whether the failure is transient and the call site should back off and retry.
    ///
    /// Timeouts are deliberately not retried: they feed the fallback and
    /// escalation logic instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkFailure(e) => !e.is_timeout() && !e.is_decode(),
            AppError::ExternalService { code, .. } => code.is_retryable(),
            _ => false,
        }
    }

    /// Whether this error stems from a timeout at any layer.
    pub fn is_timeout(&self) -> bool {
        match self {
            AppError::Timeout { .. } | AppError::LeaseTimeout { .. } => true,
            AppError::NetworkFailure(e) => e.is_timeout(),
            AppError::FetchFailed { cause, .. } => *cause == FetchFailure::Timeout,
            _ => false,
        }
    }

    /// Builds the error for a non-success HTTP response.
    pub fn from_status(service: Service, status: reqwest::StatusCode, body: &str) -> Self {
        let preview: String = body
            .chars()
            .take(crate::constants::ERROR_BODY_PREVIEW_LENGTH)
            .collect();
        AppError::ExternalService {
            service,
            code: ServiceErrorCode::from_http_status(status.as_u16()),
            message: preview,
        }
    }

    /// The cause recorded when this error marks a cache key as failed.
    pub fn failure_reason(&self) -> String {
        match self {
            AppError::FetchFailed { cause, .. } => cause.to_string(),
            AppError::KeyFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::InternalError {
            message: message.into(),
            source: None,
        }
    }
}

// Allow converting from anyhow::Error, preserving the message
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError {
            message: err.to_string(),
            source: None,
        }
    }
}

impl From<std::fmt::Error> for AppError {
    fn from(err: std::fmt::Error) -> Self {
        AppError::InternalError {
            message: "Formatting error".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Result type alias for convenience
pub type Result<T, E = AppError> = std::result::Result<T, E>;
