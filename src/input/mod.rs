// src/input/mod.rs
//! Loading the run's inputs: the category list and each category's latest
//! discovery snapshot.

mod candidates;
mod categories;

pub use candidates::parse_candidates;
pub use categories::{parse_categories, CategorySpec};

use crate::error::AppError;
use crate::model::Candidate;
use crate::output::{
    category_dir, journal_file_name, plan_versions, scan_versions, snapshot_file_name,
    SnapshotTarget, VersionPlan, LATEST_FILE_NAME,
};
use crate::pipeline::CandidateSource;
use crate::scheduler::CleaningJob;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reads and windows the categories file.
pub fn load_categories(
    path: &Path,
    start: usize,
    count: Option<usize>,
) -> Result<Vec<CategorySpec>, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::InvalidInput(format!(
            "cannot read categories file {}: {}",
            path.display(),
            e
        ))
    })?;
    let categories = parse_categories(&text, start, count);
    log::info!(
        "Loaded {} categories from {}",
        categories.len(),
        path.display()
    );
    Ok(categories)
}

/// One category's directory and the versions a run reads and writes there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDataset {
    pub category: String,
    pub dir: PathBuf,
    pub versions: VersionPlan,
}

impl CategoryDataset {
    pub fn input_path(&self) -> PathBuf {
        self.dir.join(snapshot_file_name(self.versions.input))
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.join(snapshot_file_name(self.versions.output))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.dir.join(journal_file_name(self.versions.output))
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE_NAME)
    }

    /// Tag stamped on every record this run writes for the category.
    pub fn version_tag(&self) -> String {
        self.versions.output.to_string()
    }
}

/// Candidates from `<root>/<category>/products_v<M>.<m>.csv`.
#[derive(Debug, Clone)]
pub struct DatasetSource {
    root: PathBuf,
    major: Option<u32>,
    minor: Option<u32>,
    limit: Option<usize>,
}

impl DatasetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            major: None,
            minor: None,
            limit: None,
        }
    }

    pub fn with_version_pin(mut self, major: Option<u32>, minor: Option<u32>) -> Self {
        self.major = major;
        self.minor = minor;
        self
    }

    /// Rows read per category.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn locate(&self, category: &str) -> Result<CategoryDataset, AppError> {
        let dir = category_dir(&self.root, category);
        let existing = scan_versions(&dir)?;
        let versions = plan_versions(&existing, self.major, self.minor).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "no products_v*.csv snapshot{} in {}",
                self.major
                    .map(|m| format!(" for major version {}", m))
                    .unwrap_or_default(),
                dir.display()
            ))
        })?;

        Ok(CategoryDataset {
            category: category.to_string(),
            dir,
            versions,
        })
    }
}

impl DatasetSource {
    fn read_candidates(&self, dataset: &CategoryDataset) -> Result<Vec<Candidate>, AppError> {
        let category = dataset.category.as_str();
        let path = dataset.input_path();
        let text = std::fs::read_to_string(&path).map_err(|e| {
            AppError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
        })?;

        let candidates = parse_candidates(
            &text,
            category,
            &dataset.versions.input.to_string(),
            self.limit,
        )?;
        log::info!(
            "Loaded {} candidates for {} from {}",
            candidates.len(),
            category,
            path.display()
        );
        Ok(candidates)
    }
}

impl CandidateSource for DatasetSource {
    fn load(&self, category: &str) -> Result<Vec<Candidate>, AppError> {
        self.read_candidates(&self.locate(category)?)
    }
}

/// The jobs and per-category destinations of one cleaning run.
#[derive(Debug, Default)]
pub struct RunPlan {
    pub jobs: Vec<CleaningJob>,
    pub datasets: Vec<CategoryDataset>,
    pub required_brands: BTreeMap<String, usize>,
    /// Categories left out, with the reason
    pub skipped: Vec<(String, String)>,
}

impl RunPlan {
    pub fn journal_paths(&self) -> HashMap<String, PathBuf> {
        self.datasets
            .iter()
            .map(|d| (d.category.clone(), d.journal_path()))
            .collect()
    }

    pub fn snapshot_targets(&self) -> BTreeMap<String, SnapshotTarget> {
        self.datasets
            .iter()
            .map(|d| {
                (
                    d.category.clone(),
                    SnapshotTarget {
                        snapshot: d.output_path(),
                        latest: d.latest_path(),
                    },
                )
            })
            .collect()
    }
}

/// Locates every category's snapshot and turns its candidates into jobs.
///
/// A category whose snapshot is missing or unreadable is skipped with a
/// warning; the rest of the run goes ahead.
pub fn plan_run(source: &DatasetSource, categories: &[CategorySpec]) -> RunPlan {
    let mut plan = RunPlan::default();

    for spec in categories {
        let loaded = source
            .locate(&spec.name)
            .and_then(|dataset| Ok((source.read_candidates(&dataset)?, dataset)));
        match loaded {
            Ok((candidates, dataset)) => {
                let tag: Arc<str> = Arc::from(dataset.version_tag());
                plan.jobs.extend(
                    candidates
                        .into_iter()
                        .map(|c| CleaningJob::new(c, Arc::clone(&tag))),
                );
                plan.required_brands
                    .insert(spec.name.clone(), spec.required_brands);
                plan.datasets.push(dataset);
            }
            Err(e) => {
                log::warn!("Skipping category {}: {}", spec.name, e);
                plan.skipped.push((spec.name.clone(), e.to_string()));
            }
        }
    }

    log::info!(
        "Planned {} candidates across {} categories ({} skipped)",
        plan.jobs.len(),
        plan.datasets.len(),
        plan.skipped.len()
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_the_latest_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("headphones");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("products_v1.0.csv"),
            "Product,Brand,Model,URL\nheadphones,Old,Old,https://old.example/\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("products_v1.1.csv"),
            "Product,Brand,Model,URL\nheadphones,Acme,Widget,https://acme.com/widget\n",
        )
        .unwrap();

        let source = DatasetSource::new(root.path());
        let dataset = source.locate("headphones").unwrap();
        assert_eq!(
            (dataset.versions.input.minor, dataset.versions.output.minor),
            (1, 2)
        );
        assert_eq!(dataset.version_tag(), "v1.2");
        assert!(dataset.journal_path().ends_with("headphones/.journal_v1.2.jsonl"));

        let candidates = source.load("headphones").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].brand, "Acme");
        assert_eq!(candidates[0].discovery_version, "v1.1");
    }

    #[test]
    fn plan_skips_categories_without_snapshots() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("tools");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("products_v2.0.csv"),
            "category,brand,product,proposed_url\n\
             tools,Acme,Drill,https://acme.com/drill\n\
             tools,Beta,Saw,https://beta.com/saw\n",
        )
        .unwrap();

        let categories = vec![
            CategorySpec {
                name: "tools".to_string(),
                required_brands: 2,
            },
            CategorySpec {
                name: "toys".to_string(),
                required_brands: 5,
            },
        ];
        let plan = plan_run(&DatasetSource::new(root.path()), &categories);

        assert_eq!(plan.jobs.len(), 2);
        assert!(plan.jobs.iter().all(|j| &*j.version_tag == "v2.1"));
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].0, "toys");
        assert_eq!(plan.required_brands.get("tools"), Some(&2));
        let targets = plan.snapshot_targets();
        assert!(targets["tools"].snapshot.ends_with("tools/products_v2.1.csv"));
        assert!(plan.journal_paths()["tools"].ends_with("tools/.journal_v2.1.jsonl"));
    }

    #[test]
    fn missing_category_is_an_input_error() {
        let root = tempfile::tempdir().unwrap();
        let err = DatasetSource::new(root.path()).locate("nothing").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
