// src/output/mod.rs
//! Output handling with clear separation of planning and execution.
//!
//! Snapshot delivery is planned as data (`OutputPlan`) and then executed by
//! the writer; the journal streams records while the run is in progress.

mod journal;
mod paths;
mod types;
mod writer;

pub use journal::{read_journal, JournalWriter};
pub use paths::{
    category_dir, journal_file_name, plan_versions, scan_versions, snapshot_file_name,
    VersionPlan, CONTENT_DIR_NAME, LATEST_FILE_NAME, PAGES_DIR_NAME,
};
pub use types::{DeliveryTarget, OutputPlan, OutputReport};
pub use writer::deliver;

use crate::cache::{CacheLookup, ResourceCache};
use crate::error::AppError;
use crate::fetching::extract_text;
use crate::formatting::{render_snapshot, snapshot_order};
use crate::model::{CacheKey, CleanedRecord, PageCapture, ResourceKind, StoredPage};
use crate::pipeline::SnapshotDelivery;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where one category's snapshot goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTarget {
    pub snapshot: PathBuf,
    pub latest: PathBuf,
}

/// Writes one sorted snapshot per category and refreshes `latest.csv`.
#[derive(Debug, Clone, Default)]
pub struct DatasetWriter {
    targets: BTreeMap<String, SnapshotTarget>,
}

impl DatasetWriter {
    pub fn new(targets: BTreeMap<String, SnapshotTarget>) -> Self {
        Self { targets }
    }

    /// Plans the writes for `records` without touching the filesystem.
    pub fn plan(&self, records: &[CleanedRecord]) -> OutputPlan {
        let mut by_category: BTreeMap<&str, Vec<CleanedRecord>> = self
            .targets
            .keys()
            .map(|category| (category.as_str(), Vec::new()))
            .collect();
        for record in records {
            match by_category.get_mut(record.category.as_str()) {
                Some(bucket) => bucket.push(record.clone()),
                None => log::warn!(
                    "No snapshot target for category {:?}; record {} not written",
                    record.category,
                    record.key()
                ),
            }
        }

        by_category
            .into_iter()
            .filter_map(|(category, records)| {
                self.targets
                    .get(category)
                    .map(|target| (target, render_snapshot(&records)))
            })
            .fold(OutputPlan::new(), |plan, (target, content)| {
                plan.with_operation(DeliveryTarget::WriteFile {
                    path: target.snapshot.clone(),
                    content,
                })
                .with_operation(DeliveryTarget::CopyFile {
                    from: target.snapshot.clone(),
                    to: target.latest.clone(),
                })
            })
    }

    /// Plans the page export next to each snapshot.
    ///
    /// Every resolved record whose page is cached gets `pages/<row>.html`
    /// and `content/<row>.txt`, where `<row>` is its zero-based data row in
    /// the snapshot. Both directories are emptied first, so files from an
    /// earlier export never outlive their row.
    pub async fn plan_page_export(
        &self,
        cache: &ResourceCache,
        records: &[CleanedRecord],
    ) -> Result<OutputPlan, AppError> {
        let mut plan = OutputPlan::new();

        for (category, target) in &self.targets {
            let dir = target.snapshot.parent().unwrap_or_else(|| Path::new("."));
            let pages = dir.join(PAGES_DIR_NAME);
            let content = dir.join(CONTENT_DIR_NAME);
            plan = plan
                .with_operation(DeliveryTarget::ResetDir {
                    path: pages.clone(),
                })
                .with_operation(DeliveryTarget::ResetDir {
                    path: content.clone(),
                });

            let rows = snapshot_order(records.iter().filter(|r| &r.category == category));
            for (row, record) in rows.into_iter().enumerate() {
                let key = match (&record.page_payload_ref, record.is_resolved()) {
                    (Some(key), true) => key,
                    _ => continue,
                };
                let Some(capture) = cached_capture(cache, key).await? else {
                    log::warn!(
                        "Page {} of {} is not in the cache; not exported",
                        key,
                        record.key()
                    );
                    continue;
                };
                plan = plan
                    .with_operation(DeliveryTarget::WriteFile {
                        path: content.join(format!("{}.txt", row)),
                        content: extract_text(&capture.html),
                    })
                    .with_operation(DeliveryTarget::WriteFile {
                        path: pages.join(format!("{}.html", row)),
                        content: capture.html,
                    });
            }
        }
        Ok(plan)
    }
}

async fn cached_capture(
    cache: &ResourceCache,
    key: &CacheKey,
) -> Result<Option<PageCapture>, AppError> {
    match cache.get(ResourceKind::Webpage, key).await? {
        CacheLookup::Hit(entry) => {
            let stored: StoredPage = serde_json::from_str(&entry.payload)?;
            Ok(stored.capture().cloned())
        }
        CacheLookup::Miss | CacheLookup::Failed(_) => Ok(None),
    }
}

impl SnapshotDelivery for DatasetWriter {
    fn deliver(&self, records: &[CleanedRecord]) -> Result<OutputReport, AppError> {
        deliver(self.plan(records))
    }
}
