// src/types/urls.rs
//! URL comparison rules used when correlating proposed URLs with search results.
//!
//! Two URLs "match exactly" when their normalized forms are equal: scheme,
//! query string, fragment, a leading `www.` and trailing slashes are ignored,
//! and the host is compared case-insensitively.

use super::ValidatedUrl;
use std::fmt;

/// Second-level labels under which registrations happen one level deeper
/// (`acme.co.uk` rather than `co.uk`).
const GENERIC_SECOND_LEVEL_LABELS: &[&str] = &[
    "co", "com", "net", "org", "gov", "edu", "ac", "or", "ne", "go", "gob", "gv",
];

/// Hosts that sell or discuss products but never serve a brand's own product page.
const NON_OFFICIAL_SITES: &[&str] = &[
    "amazon.",
    "ebay.",
    "walmart.",
    "bestbuy.",
    "target.com",
    "newegg.",
    "aliexpress.",
    "alibaba.",
    "etsy.",
    "homedepot.",
    "lowes.",
    "costco.",
    "bhphotovideo.",
    "reddit.",
    "youtube.",
    "wikipedia.",
    "facebook.",
    "instagram.",
    "pinterest.",
    "twitter.",
    "tiktok.",
    "google.",
];

/// The comparison form of a URL: `host/path` with no scheme, query or fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn from_url(url: &ValidatedUrl) -> Self {
        let host = url.host().to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        let path = url.as_url().path().trim_end_matches('/');
        Self(format!("{}{}", host, path))
    }

    /// Normalizes a raw string, returning `None` when it is not an http(s) URL.
    pub fn parse(raw: &str) -> Option<Self> {
        ValidatedUrl::parse(raw).ok().map(|u| Self::from_url(&u))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns the registrable domain of a URL's host (`shop.acme.co.uk` → `acme.co.uk`).
///
/// Approximates the public suffix list: the last two labels, or the last
/// three when the second-to-last label is a generic second-level label
/// under a two-letter country code.
pub fn registered_domain(url: &ValidatedUrl) -> String {
    let host = url.host().to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();

    if labels.len() <= 2 || host.parse::<std::net::IpAddr>().is_ok() {
        return host.trim_start_matches("www.").to_string();
    }

    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let keep = if tld.len() == 2 && GENERIC_SECOND_LEVEL_LABELS.contains(&second) {
        3
    } else {
        2
    };

    labels[labels.len() - keep..].join(".")
}

/// Whether the URL points below the site root (`/` alone is a landing page).
pub fn has_product_path(url: &ValidatedUrl) -> bool {
    !url.as_url().path().trim_matches('/').is_empty()
}

/// Whether the URL belongs to a marketplace, social or reference site.
///
/// Amazon is allowed when the brand itself is Amazon.
pub fn is_non_official_site(url: &ValidatedUrl, brand: &str) -> bool {
    let host = url.host().to_ascii_lowercase();
    let brand_is_amazon = brand.to_ascii_lowercase().contains("amazon");
    NON_OFFICIAL_SITES.iter().any(|marker| {
        if *marker == "amazon." && brand_is_amazon {
            return false;
        }
        host.contains(marker)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> ValidatedUrl {
        ValidatedUrl::parse(s).unwrap()
    }

    #[test]
    fn normalization_ignores_scheme_query_and_trailing_slash() {
        let a = NormalizedUrl::from_url(&url("https://acme.com/widget/"));
        let b = NormalizedUrl::from_url(&url("http://ACME.com/widget?ref=llm#specs"));
        let c = NormalizedUrl::from_url(&url("https://www.acme.com/widget"));
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.as_str(), "acme.com/widget");
    }

    #[test]
    fn normalization_keeps_path_case() {
        let a = NormalizedUrl::from_url(&url("https://acme.com/Widget"));
        let b = NormalizedUrl::from_url(&url("https://acme.com/widget"));
        assert_ne!(a, b);
    }

    #[test]
    fn registered_domain_handles_country_second_levels() {
        assert_eq!(registered_domain(&url("https://shop.acme.com/x")), "acme.com");
        assert_eq!(registered_domain(&url("https://www.acme.co.uk/x")), "acme.co.uk");
        assert_eq!(registered_domain(&url("https://acme.com.au/")), "acme.com.au");
        assert_eq!(registered_domain(&url("https://acme.io")), "acme.io");
        assert_eq!(registered_domain(&url("https://eu.store.acme.de/p")), "acme.de");
    }

    #[test]
    fn product_path_requires_non_root() {
        assert!(!has_product_path(&url("https://acme.com/")));
        assert!(!has_product_path(&url("https://acme.com")));
        assert!(has_product_path(&url("https://acme.com/widget")));
    }

    #[test]
    fn marketplaces_are_not_official_unless_brand_matches() {
        let listing = url("https://www.amazon.com/dp/B000123");
        assert!(is_non_official_site(&listing, "Acme"));
        assert!(!is_non_official_site(&listing, "Amazon Basics"));
        assert!(is_non_official_site(&url("https://www.ebay.com/itm/1"), "Acme"));
        assert!(!is_non_official_site(&url("https://acme.com/widget"), "Acme"));
    }
}
