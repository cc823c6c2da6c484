// src/input/candidates.rs
//! Candidate rows from a discovery snapshot.

use crate::error::AppError;
use crate::formatting::parse_csv;
use crate::model::{Candidate, CandidateKey, Confidence};
use std::collections::HashSet;

/// Column positions of the fields a candidate needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    category: Option<usize>,
    brand: usize,
    product: usize,
    url: usize,
    /// The URL column is a cleaned snapshot's `final_url`
    cleaned: bool,
    confidence: Option<usize>,
}

impl Columns {
    /// Discovery snapshots name the category `Product` and the product
    /// `Model`; the native layout uses `category, brand, product,
    /// proposed_url`, and a cleaned snapshot carries `final_url` instead.
    /// Matching is case-insensitive.
    fn from_header(header: &[String]) -> Result<Self, AppError> {
        let names: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |wanted: &[&str]| names.iter().position(|n| wanted.contains(&n.as_str()));

        let (category, product) = match find(&["model"]) {
            Some(model) => (find(&["product", "category"]), Some(model)),
            None => (find(&["category"]), find(&["product"])),
        };
        let brand = find(&["brand"]);
        let (url, cleaned) = match find(&["proposed_url", "url"]) {
            Some(url) => (Some(url), false),
            None => (find(&["final_url"]), true),
        };

        match (brand, product, url) {
            (Some(brand), Some(product), Some(url)) => Ok(Self {
                category,
                brand,
                product,
                url,
                cleaned,
                confidence: find(&["confidence"]),
            }),
            _ => Err(AppError::InvalidInput(format!(
                "candidate header must name brand, product/model and url columns, found: {}",
                header.join(",")
            ))),
        }
    }
}

/// Whether a cleaned snapshot row resolved to a URL worth cleaning again.
fn carried_forward(row: &[String], columns: &Columns, url: &str) -> bool {
    let resolved = columns
        .confidence
        .and_then(|i| row.get(i))
        .and_then(|label| Confidence::parse(label.trim()))
        .map_or(true, |c| !matches!(c, Confidence::Unresolved | Confidence::Failed));
    !url.is_empty() && resolved
}

/// Parses candidate CSV text for `category`.
///
/// At most `limit` data rows are read. Rows repeating an earlier
/// (category, brand, product) are dropped with a warning; rows with missing
/// fields are kept and fail at processing time, so they still produce a
/// record. Rows a previous cleaning left unresolved are not carried into the
/// next version.
pub fn parse_candidates(
    text: &str,
    category: &str,
    discovery_version: &str,
    limit: Option<usize>,
) -> Result<Vec<Candidate>, AppError> {
    let mut rows = parse_csv(text)?.into_iter();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let columns = Columns::from_header(&header)?;
    let cell = |row: &[String], i: usize| row.get(i).map(|s| s.trim().to_string()).unwrap_or_default();

    let mut seen: HashSet<CandidateKey> = HashSet::new();
    let mut candidates = Vec::new();

    for (line, row) in rows.take(limit.unwrap_or(usize::MAX)).enumerate() {
        if let Some(own) = columns.category.map(|i| cell(&row, i).to_lowercase()) {
            if !own.is_empty() && own != category {
                log::warn!(
                    "Row {} names category {:?}; filing it under {:?}",
                    line + 2,
                    own,
                    category
                );
            }
        }

        let url = cell(&row, columns.url);
        if columns.cleaned && !carried_forward(&row, &columns, &url) {
            log::info!(
                "Row {} was left unresolved by an earlier cleaning; not carried forward",
                line + 2
            );
            continue;
        }

        let candidate = Candidate::new(
            category,
            cell(&row, columns.brand),
            cell(&row, columns.product),
            url,
        )
        .with_discovery_version(discovery_version);

        if !seen.insert(candidate.key()) {
            log::warn!("Dropping duplicate candidate {} (row {})", candidate.key(), line + 2);
            continue;
        }
        candidates.push(candidate);
    }

    Ok(candidates)
}
