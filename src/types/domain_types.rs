// src/types/domain_types.rs
//! Domain-specific newtypes for type safety and validation.

use super::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Credential for one of the paid services (search, LLM, renderer).
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Create a new API key with validation
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into().trim().to_string();

        if key.is_empty() {
            return Err(ValidationError::InvalidApiKey {
                reason: "API key cannot be empty".to_string(),
            });
        }

        if key.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidApiKey {
                reason: "API key cannot contain whitespace".to_string(),
            });
        }

        if key.len() < 8 {
            return Err(ValidationError::InvalidApiKey {
                reason: "API key is too short".to_string(),
            });
        }

        Ok(Self(key))
    }

    /// Get the API key as a string reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Redact API key in display
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "{}...", prefix)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self)
    }
}

/// Validated URL type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedUrl(Url);

// Manual Serialize/Deserialize implementation for Url
impl Serialize for ValidatedUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ValidatedUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ValidatedUrl::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl ValidatedUrl {
    /// Parses an http(s) URL.
    ///
    /// Spaces are removed first: language models regularly emit URLs with
    /// stray spaces inside path segments.
    pub fn parse(url: &str) -> Result<Self, ValidationError> {
        let cleaned: String = url.chars().filter(|c| !c.is_whitespace()).collect();
        match Url::parse(&cleaned) {
            Ok(parsed_url) => {
                if parsed_url.scheme() != "http" && parsed_url.scheme() != "https" {
                    return Err(ValidationError::InvalidUrl {
                        url: url.to_string(),
                        reason: "Only HTTP and HTTPS URLs are supported".to_string(),
                    });
                }
                if parsed_url.host_str().is_none() {
                    return Err(ValidationError::InvalidUrl {
                        url: url.to_string(),
                        reason: "URL has no host".to_string(),
                    });
                }
                Ok(Self(parsed_url))
            }
            Err(e) => Err(ValidationError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Get the URL as a string
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the underlying URL
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// The lowercase host, without any port.
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }
}

impl fmt::Display for ValidatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a language model, e.g. `gpt-3.5-turbo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':'))
        {
            return Err(ValidationError::InvalidModelId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Wayback-style capture timestamp (`YYYYMMDDhhmmss`).
///
/// Pinning one makes archival replay deterministic across re-runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveTimestamp(chrono::NaiveDateTime);

impl ArchiveTimestamp {
    const FORMAT: &'static str = "%Y%m%d%H%M%S";

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        chrono::NaiveDateTime::parse_from_str(input.trim(), Self::FORMAT)
            .map(Self)
            .map_err(|_| ValidationError::InvalidTimestamp {
                input: input.to_string(),
            })
    }

    pub fn now() -> Self {
        Self(chrono::Utc::now().naive_utc())
    }

    pub fn as_compact(&self) -> String {
        self.0.format(Self::FORMAT).to_string()
    }
}

impl fmt::Display for ArchiveTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_compact())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_validation() {
        assert!(ApiKey::new("sk-abcdefghijklmnopqrs").is_ok());
        assert!(ApiKey::new("").is_err());
        assert!(ApiKey::new("short").is_err());
        assert!(ApiKey::new("has space inside").is_err());
    }

    #[test]
    fn test_api_key_is_redacted() {
        let key = ApiKey::new("sk-abcdefghijklmnopqrs").unwrap();
        assert_eq!(key.to_string(), "sk-a...");
        assert!(!format!("{:?}", key).contains("abcdefgh"));
    }

    #[test]
    fn test_url_validation() {
        assert!(ValidatedUrl::parse("https://acme.com/widget").is_ok());
        assert!(ValidatedUrl::parse("http://localhost:8080").is_ok());
        assert!(ValidatedUrl::parse("ftp://example.com").is_err());
        assert!(ValidatedUrl::parse("not a url").is_err());
    }

    #[test]
    fn test_url_spaces_are_removed() {
        let url = ValidatedUrl::parse("https://acme.com/widget pro").unwrap();
        assert_eq!(url.as_str(), "https://acme.com/widgetpro");
    }

    #[test]
    fn test_model_id_validation() {
        assert!(ModelId::new("gpt-3.5-turbo").is_ok());
        assert!(ModelId::new("openai/gpt-4o").is_ok());
        assert!(ModelId::new("").is_err());
        assert!(ModelId::new("gpt 4").is_err());
    }

    #[test]
    fn test_archive_timestamp_round_trips_compact_form() {
        let ts = ArchiveTimestamp::parse("20240415093000").unwrap();
        assert_eq!(ts.as_compact(), "20240415093000");
        assert!(ArchiveTimestamp::parse("2024-04-15").is_err());
    }
}
