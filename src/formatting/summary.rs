// src/formatting/summary.rs
//! Plain-text table of per-category outcome counts.

use crate::analytics::RunSummary;
use crate::model::Confidence;
use std::fmt::Write;

pub fn render_summary(summary: &RunSummary) -> String {
    let mut header: Vec<String> = vec!["category".to_string()];
    header.extend(Confidence::ALL.iter().map(|c| c.to_string()));
    header.push("total".to_string());

    let mut rows: Vec<Vec<String>> = summary
        .categories
        .iter()
        .map(|(name, category)| {
            let mut row = vec![name.clone()];
            row.extend(Confidence::ALL.iter().map(|c| category.count(*c).to_string()));
            row.push(category.total().to_string());
            row
        })
        .collect();

    let mut totals = vec!["TOTAL".to_string()];
    totals.extend(Confidence::ALL.iter().map(|c| summary.total(*c).to_string()));
    totals.push(summary.total_records().to_string());
    rows.push(totals);

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(header[i].chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut out = String::new();
    push_row(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }

    for (name, category) in &summary.categories {
        if let (Some(missing), Some(required)) = (category.brand_shortfall(), category.required_brands) {
            let _ = writeln!(
                out,
                "warning: {} has {} brands with a URL, {} required ({} short)",
                name,
                category.brands_with_url(),
                required,
                missing
            );
        }
    }

    if let Some((threshold, failures)) = summary.aborted {
        let _ = writeln!(
            out,
            "run aborted: {} failures exceeded the threshold of {}; {} candidates not started",
            failures, threshold, summary.not_started
        );
    }
    out
}

/// First column left-aligned, counts right-aligned.
fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(i, (cell, width))| {
            if i == 0 {
                format!("{:<width$}", cell, width = width)
            } else {
                format!("{:>width$}", cell, width = width)
            }
        })
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, CleanedRecord};
    use std::collections::BTreeMap;

    #[test]
    fn renders_counts_totals_and_warnings() {
        let candidate = Candidate::new("tools", "Acme", "Widget", "https://acme.com/w");
        let mut exact = CleanedRecord::without_url(&candidate, Confidence::Exact, None, "v1.1");
        exact.final_url = Some("https://acme.com/w".to_string());
        let failed = CleanedRecord::failed(
            &Candidate::new("tools", "Beta", "Gadget", ""),
            crate::model::ReasonCode::InvalidCandidate,
            "v1.1",
        );

        let required = BTreeMap::from([("tools".to_string(), 2)]);
        let summary = RunSummary::from_records(&[exact, failed], &required).with_abort(0, 1, 3);
        let text = render_summary(&summary);

        insta::assert_snapshot!(text, @r###"
        category  Exact  DomainMatch  Resolved-by-LLM  Unresolved  Failed  total
        --------  -----  -----------  ---------------  ----------  ------  -----
        tools         1            0                0           0       1      2
        TOTAL         1            0                0           0       1      2
        warning: tools has 1 brands with a URL, 2 required (1 short)
        run aborted: 1 failures exceeded the threshold of 0; 3 candidates not started
        "###);
    }
}
