// src/arbitration/response.rs
//! Parsing free-text model answers into a choice.

use crate::model::SearchHit;
use crate::types::NormalizedUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedChoice {
    /// Zero-based index into the presented results
    Chosen(usize),
    NoneMatch,
    Invalid,
}

const NONE_ANSWERS: &[&str] = &["none", "none match", "none matches", "no match", "none_match"];

/// Interprets the first non-empty line of an answer.
///
/// Accepts a 1-based result number (optionally written `#2` or `2.`), a
/// "none" variant, or a URL equal after normalization to a presented one.
pub fn parse_response(raw: &str, hits: &[SearchHit]) -> ParsedChoice {
    let Some(line) = raw.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return ParsedChoice::Invalid;
    };
    let token = line
        .trim_matches(|c: char| c.is_whitespace() || "\"'`*.,;:!()[]".contains(c))
        .trim_start_matches('#');

    if NONE_ANSWERS.contains(&token.to_lowercase().as_str()) {
        return ParsedChoice::NoneMatch;
    }

    if let Ok(number) = token.parse::<usize>() {
        return if (1..=hits.len()).contains(&number) {
            ParsedChoice::Chosen(number - 1)
        } else {
            ParsedChoice::Invalid
        };
    }

    if let Some(answer) = NormalizedUrl::parse(token) {
        if let Some(index) = hits
            .iter()
            .position(|hit| NormalizedUrl::parse(&hit.url).as_ref() == Some(&answer))
        {
            return ParsedChoice::Chosen(index);
        }
    }

    ParsedChoice::Invalid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits() -> Vec<SearchHit> {
        ["https://reviews.example/widget", "https://acme.com/widget"]
            .iter()
            .enumerate()
            .map(|(i, url)| SearchHit {
                rank: i + 1,
                title: String::new(),
                url: url.to_string(),
                snippet: String::new(),
            })
            .collect()
    }

    #[test]
    fn numbers_are_one_based() {
        assert_eq!(parse_response("1", &hits()), ParsedChoice::Chosen(0));
        assert_eq!(parse_response("  #2.\nbecause...", &hits()), ParsedChoice::Chosen(1));
        assert_eq!(parse_response("0", &hits()), ParsedChoice::Invalid);
        assert_eq!(parse_response("3", &hits()), ParsedChoice::Invalid);
    }

    #[test]
    fn none_variants() {
        for answer in ["none", "None.", "\"NONE MATCH\"", "no match"] {
            assert_eq!(parse_response(answer, &hits()), ParsedChoice::NoneMatch, "{}", answer);
        }
    }

    #[test]
    fn urls_match_after_normalization() {
        assert_eq!(
            parse_response("http://www.acme.com/widget/", &hits()),
            ParsedChoice::Chosen(1)
        );
        assert_eq!(
            parse_response("https://acme.com/other", &hits()),
            ParsedChoice::Invalid
        );
    }

    #[test]
    fn chatter_is_invalid() {
        assert_eq!(parse_response("", &hits()), ParsedChoice::Invalid);
        assert_eq!(
            parse_response("I think the second one", &hits()),
            ParsedChoice::Invalid
        );
    }
}
