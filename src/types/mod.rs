// src/types/mod.rs
//! Validated domain newtypes shared across the pipeline.

use thiserror::Error;

mod domain_types;
mod urls;

pub use domain_types::*;
pub use urls::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Empty required field: {0}")]
    EmptyField(&'static str),

    #[error("Value out of bounds: {value}, expected {min}..={max}")]
    OutOfBounds { value: u64, min: u64, max: u64 },

    #[error("Invalid API key format: {reason}")]
    InvalidApiKey { reason: String },

    #[error("Invalid model identifier: {0}")]
    InvalidModelId(String),

    #[error("Invalid archive timestamp '{input}': expected YYYYMMDDhhmmss")]
    InvalidTimestamp { input: String },

    #[error("Invalid file path: {path} - {reason}")]
    InvalidFilePath { path: String, reason: String },
}
