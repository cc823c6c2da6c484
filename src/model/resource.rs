// src/model/resource.rs
//! Cache vocabulary: resource kinds, content-addressed keys and entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The three classes of cached external-call results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Webpage,
    SearchResult,
    LlmCompletion,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Webpage,
        ResourceKind::SearchResult,
        ResourceKind::LlmCompletion,
    ];

    /// Directory name of this kind's partition.
    pub fn partition_name(&self) -> &'static str {
        match self {
            Self::Webpage => "webpage",
            Self::SearchResult => "search_result",
            Self::LlmCompletion => "llm_completion",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.partition_name())
    }
}

/// How a webpage was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    LiveRender,
    ArchivalReplay,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LiveRender => "live_render",
            Self::ArchivalReplay => "archival_replay",
        }
    }
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stable hash of the semantically relevant inputs of an external call.
///
/// SHA-256 over the parts joined by the ASCII unit separator, so the key is
/// identical across processes, machines and toolchain versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive<S: AsRef<str>>(parts: &[S]) -> Self {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([0x1f]);
            }
            hasher.update(part.as_ref().as_bytes());
        }
        Self(hex_digest(hasher.finalize().as_slice()))
    }

    /// Rebuilds a key read back from disk or a snapshot.
    pub fn from_hex(hex: impl Into<String>) -> Option<Self> {
        let hex = hex.into();
        (hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())).then_some(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fingerprint of a payload, used to tell idempotent puts from conflicting ones.
pub fn fingerprint(payload: &str) -> String {
    hex_digest(Sha256::digest(payload.as_bytes()).as_slice())
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Audit metadata supplied alongside a payload when it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// The method, provider or model that produced the payload
    pub fetch_method: String,
    pub latency_ms: u64,
}

impl EntryMeta {
    pub fn new(fetch_method: impl Into<String>) -> Self {
        Self {
            fetch_method: fetch_method.into(),
            latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// An immutable, committed cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub resource_kind: ResourceKind,
    pub key: CacheKey,
    pub payload: String,
    pub fingerprint: String,
    pub fetch_method: String,
    pub fetch_timestamp: DateTime<Utc>,
    pub latency_ms: u64,
}

impl CacheEntry {
    pub fn new(kind: ResourceKind, key: CacheKey, payload: String, meta: EntryMeta) -> Self {
        Self {
            resource_kind: kind,
            fingerprint: fingerprint(&payload),
            key,
            payload,
            fetch_method: meta.fetch_method,
            fetch_timestamp: Utc::now(),
            latency_ms: meta.latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_hex_digests() {
        let key = CacheKey::derive(&["acme.com/widget", "live_render"]);
        assert_eq!(key.as_str().len(), 64);
        assert_eq!(key, CacheKey::derive(&["acme.com/widget", "live_render"]));
        assert_eq!(CacheKey::from_hex(key.as_str()), Some(key));
    }

    #[test]
    fn part_boundaries_change_the_key() {
        assert_ne!(CacheKey::derive(&["ab", "c"]), CacheKey::derive(&["a", "bc"]));
    }

    #[test]
    fn known_digest() {
        // sha256("abc")
        assert_eq!(
            CacheKey::derive(&["abc"]).as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn fingerprint_tracks_payload() {
        assert_eq!(fingerprint("<html/>"), fingerprint("<html/>"));
        assert_ne!(fingerprint("<html/>"), fingerprint("<html></html>"));
    }
}
