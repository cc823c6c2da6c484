// src/fetching/document.rs
//! Heuristics deciding whether a retrieved document is a usable product page.

use crate::constants::{BOT_BLOCK_MAX_DOCUMENT_BYTES, MIN_PAGE_TEXT_CHARS};
use crate::error::FetchFailure;
use scraper::Html;

/// Case-insensitive markers of anti-automation challenge pages, with the
/// signal name reported for each.
const CHALLENGE_MARKERS: &[(&str, &str)] = &[
    ("g-recaptcha", "captcha"),
    ("h-captcha", "captcha"),
    ("px-captcha", "perimeterx"),
    ("_pxhd", "perimeterx"),
    ("cf-challenge", "cloudflare"),
    ("cf-browser-verification", "cloudflare"),
    ("just a moment...", "cloudflare"),
    ("attention required! | cloudflare", "cloudflare"),
    ("access denied", "access denied"),
    ("unusual traffic", "unusual traffic"),
    ("are you a robot", "robot check"),
    ("verify you are human", "robot check"),
    ("captcha", "captcha"),
];

/// Phrases in page text saying the product can no longer be bought.
const UNAVAILABLE_PHRASES: &[&str] = &[
    "discontinued",
    "no longer available",
    "no longer sold",
    "no longer in production",
    "currently unavailable",
    "this product is unavailable",
    "product is not available",
    "end of life",
];

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Returns the challenge signal found in `html`, if any.
///
/// Only small documents are inspected: a full product page that mentions a
/// captcha in a script or footer is still a product page.
fn detect_bot_block(html: &str) -> Option<&'static str> {
    if html.len() > BOT_BLOCK_MAX_DOCUMENT_BYTES {
        return None;
    }
    let lowered = html.to_lowercase();
    CHALLENGE_MARKERS
        .iter()
        .find(|(marker, _)| lowered.contains(marker))
        .map(|(_, signal)| *signal)
}

/// Visible text of an HTML document, whitespace collapsed to single spaces.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| {
                parent
                    .value()
                    .as_element()
                    .map(|e| HIDDEN_ELEMENTS.contains(&e.name()))
            })
            .unwrap_or(false);
        if hidden {
            continue;
        }
        for word in chunk.split_whitespace() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
        }
    }
    text
}

/// The first unavailability phrase in `text`, if any.
fn detect_unavailable(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    UNAVAILABLE_PHRASES
        .iter()
        .find(|phrase| lowered.contains(*phrase))
        .copied()
}

/// Checks a retrieved document, classifying unusable ones.
pub fn check_document(html: &str) -> Result<(), FetchFailure> {
    if let Some(signal) = detect_bot_block(html) {
        return Err(FetchFailure::BotBlocked(signal.to_string()));
    }
    let text = extract_text(html);
    if text.chars().count() < MIN_PAGE_TEXT_CHARS {
        return Err(FetchFailure::EmptyDocument);
    }
    match detect_unavailable(&text) {
        Some(phrase) => {
            log::debug!("Page text says {:?}", phrase);
            Err(FetchFailure::Unavailable(phrase.to_string()))
        }
        None => Ok(()),
    }
}

/// Whether the URL names a PDF rather than a product page.
pub fn is_pdf(url: &url::Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".pdf")
}
