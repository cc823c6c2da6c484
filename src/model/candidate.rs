// src/model/candidate.rs
//! Candidates proposed by the discovery stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a product within a run: at most one record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateKey {
    pub category: String,
    pub brand: String,
    pub product: String,
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.category, self.brand, self.product)
    }
}

/// A (category, brand, product, proposed_url) tuple awaiting verification.
///
/// `proposed_url` stays a raw string: model output is frequently malformed
/// and must still yield a recorded outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub category: String,
    pub brand: String,
    pub product: String,
    pub proposed_url: String,
    pub discovery_version: String,
}

impl Candidate {
    pub fn new(
        category: impl Into<String>,
        brand: impl Into<String>,
        product: impl Into<String>,
        proposed_url: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            brand: brand.into(),
            product: product.into(),
            proposed_url: proposed_url.into(),
            discovery_version: String::new(),
        }
    }

    pub fn with_discovery_version(mut self, version: impl Into<String>) -> Self {
        self.discovery_version = version.into();
        self
    }

    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            category: self.category.clone(),
            brand: self.brand.clone(),
            product: self.product.clone(),
        }
    }

    /// The first missing required field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.category.trim().is_empty() {
            Some("category")
        } else if self.brand.trim().is_empty() {
            Some("brand")
        } else if self.product.trim().is_empty() {
            Some("product")
        } else {
            None
        }
    }
}
