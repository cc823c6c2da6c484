// src/formatting/snapshot.rs
//! Renders cleaned records as a snapshot CSV.

use super::csv::write_row;
use crate::model::CleanedRecord;

pub const SNAPSHOT_COLUMNS: [&str; 9] = [
    "category",
    "brand",
    "product",
    "final_url",
    "confidence",
    "fetch_method",
    "version_tag",
    "page_payload_ref",
    "reason",
];

/// Records in snapshot row order: by (category, brand, product).
pub fn snapshot_order<'a>(
    records: impl IntoIterator<Item = &'a CleanedRecord>,
) -> Vec<&'a CleanedRecord> {
    let mut sorted: Vec<&CleanedRecord> = records.into_iter().collect();
    sorted.sort_by(|a, b| {
        (&a.category, &a.brand, &a.product).cmp(&(&b.category, &b.brand, &b.product))
    });
    sorted
}

/// Snapshot text for `records`, in `snapshot_order`.
/// Absent values are written as empty cells.
pub fn render_snapshot(records: &[CleanedRecord]) -> String {
    let mut out = String::new();
    write_row(&mut out, &SNAPSHOT_COLUMNS);
    for record in snapshot_order(records) {
        write_row(&mut out, &snapshot_row(record));
    }
    out
}

fn snapshot_row(record: &CleanedRecord) -> [String; 9] {
    [
        record.category.clone(),
        record.brand.clone(),
        record.product.clone(),
        record.final_url.clone().unwrap_or_default(),
        record.confidence.to_string(),
        record
            .fetch_method
            .map(|m| m.to_string())
            .unwrap_or_default(),
        record.version_tag.clone(),
        record
            .page_payload_ref
            .as_ref()
            .map(|k| k.to_string())
            .unwrap_or_default(),
        record.reason.map(|r| r.to_string()).unwrap_or_default(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, CacheKey, Confidence, FetchMethod, FetchStatus, ReasonCode};

    #[test]
    fn rows_are_sorted_and_quoted() {
        let mut fetched = CleanedRecord::without_url(
            &Candidate::new("tools", "Zeta", "Drill, cordless", "https://zeta.com/d"),
            Confidence::DomainMatch,
            None,
            "v1.1",
        );
        fetched.final_url = Some("https://zeta.com/drill".to_string());
        fetched.fetch_method = Some(FetchMethod::ArchivalReplay);
        fetched.fetch_status = FetchStatus::Fetched;
        fetched.page_payload_ref = Some(CacheKey::derive(&["https://zeta.com/drill", "archival_replay"]));
        let key = fetched.page_payload_ref.clone().unwrap();

        let unresolved = CleanedRecord::without_url(
            &Candidate::new("tools", "Acme", "Widget", "https://acme.com/w"),
            Confidence::Unresolved,
            Some(ReasonCode::ArbitrationNoneMatch),
            "v1.1",
        );

        let text = render_snapshot(&[fetched, unresolved]);
        let expected = format!(
            "category,brand,product,final_url,confidence,fetch_method,version_tag,page_payload_ref,reason\n\
             tools,Acme,Widget,,Unresolved,,v1.1,,arbitration_none_match\n\
             tools,Zeta,\"Drill, cordless\",https://zeta.com/drill,DomainMatch,archival_replay,v1.1,{},\n",
            key
        );
        assert_eq!(text, expected);
    }
}
