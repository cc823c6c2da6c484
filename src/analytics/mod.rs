// src/analytics/mod.rs
//! Per-category outcome counts for the end-of-run summary.

use crate::model::{CleanedRecord, Confidence};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome counts of one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySummary {
    counts: [usize; 5],
    brands_with_url: BTreeSet<String>,
    /// Distinct brands the category should have; unknown when not listed
    pub required_brands: Option<usize>,
}

impl CategorySummary {
    fn add(&mut self, record: &CleanedRecord) {
        self.counts[index_of(record.confidence)] += 1;
        if record.is_resolved() {
            self.brands_with_url.insert(record.brand.to_lowercase());
        }
    }

    pub fn count(&self, confidence: Confidence) -> usize {
        self.counts[index_of(confidence)]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn brands_with_url(&self) -> usize {
        self.brands_with_url.len()
    }

    /// Brands missing relative to the requirement, when short.
    pub fn brand_shortfall(&self) -> Option<usize> {
        let required = self.required_brands?;
        required
            .checked_sub(self.brands_with_url())
            .filter(|&missing| missing > 0)
    }
}

fn index_of(confidence: Confidence) -> usize {
    Confidence::ALL
        .iter()
        .position(|c| *c == confidence)
        .unwrap_or_default()
}

/// Counts for every category of a run, complete or aborted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub categories: BTreeMap<String, CategorySummary>,
    /// `(threshold, failures)` when the run was aborted
    pub aborted: Option<(usize, usize)>,
    pub not_started: usize,
}

impl RunSummary {
    /// Tallies `records`; every category in `required` is listed even when
    /// it produced nothing.
    pub fn from_records(records: &[CleanedRecord], required: &BTreeMap<String, usize>) -> Self {
        let mut categories: BTreeMap<String, CategorySummary> = required
            .iter()
            .map(|(name, &required_brands)| {
                (
                    name.clone(),
                    CategorySummary {
                        required_brands: Some(required_brands),
                        ..CategorySummary::default()
                    },
                )
            })
            .collect();

        for record in records {
            categories
                .entry(record.category.clone())
                .or_default()
                .add(record);
        }

        Self {
            categories,
            aborted: None,
            not_started: 0,
        }
    }

    pub fn with_abort(mut self, threshold: usize, failures: usize, not_started: usize) -> Self {
        self.aborted = Some((threshold, failures));
        self.not_started = not_started;
        self
    }

    pub fn total(&self, confidence: Confidence) -> usize {
        self.categories.values().map(|c| c.count(confidence)).sum()
    }

    pub fn total_records(&self) -> usize {
        self.categories.values().map(CategorySummary::total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Candidate;

    fn record(category: &str, brand: &str, confidence: Confidence, url: Option<&str>) -> CleanedRecord {
        let candidate = Candidate::new(category, brand, "Widget", "https://example.com/");
        let mut record = CleanedRecord::without_url(&candidate, confidence, None, "v1.1");
        record.final_url = url.map(str::to_string);
        record
    }

    #[test]
    fn counts_by_category_and_confidence() {
        let records = vec![
            record("tools", "Acme", Confidence::Exact, Some("https://acme.com/a")),
            record("tools", "ACME", Confidence::DomainMatch, Some("https://acme.com/b")),
            record("tools", "Beta", Confidence::Unresolved, None),
            record("toys", "Gamma", Confidence::ResolvedByLlm, Some("https://gamma.com/x")),
        ];
        let required = BTreeMap::from([("tools".to_string(), 3), ("garden".to_string(), 20)]);
        let summary = RunSummary::from_records(&records, &required);

        let tools = &summary.categories["tools"];
        assert_eq!(tools.count(Confidence::Exact), 1);
        assert_eq!(tools.count(Confidence::Unresolved), 1);
        assert_eq!(tools.total(), 3);
        assert_eq!(tools.brands_with_url(), 1);
        assert_eq!(tools.brand_shortfall(), Some(2));

        assert_eq!(summary.categories["garden"].total(), 0);
        assert_eq!(summary.categories["toys"].brand_shortfall(), None);
        assert_eq!(summary.total(Confidence::ResolvedByLlm), 1);
        assert_eq!(summary.total_records(), 4);
    }
}
