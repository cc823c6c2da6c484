// src/output/paths.rs
//! Pure functions for dataset layout: versioned snapshot names and the
//! choice of which version a run reads and writes.
//!
//! A category directory holds `products_v<major>.<minor>.csv` snapshots,
//! the `latest.csv` copy of the newest one, and one journal per cleaning
//! version.

use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};

pub const LATEST_FILE_NAME: &str = "latest.csv";
pub const PAGES_DIR_NAME: &str = "pages";
pub const CONTENT_DIR_NAME: &str = "content";

static SNAPSHOT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^products_v(\d+)\.(\d+)\.csv$").expect("snapshot file name pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatasetVersion {
    pub major: u32,
    pub minor: u32,
}

impl DatasetVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

pub fn snapshot_file_name(version: DatasetVersion) -> String {
    format!("products_{}.csv", version)
}

pub fn journal_file_name(version: DatasetVersion) -> String {
    format!(".journal_{}.jsonl", version)
}

pub fn parse_snapshot_file_name(name: &str) -> Option<DatasetVersion> {
    let caps = SNAPSHOT_NAME.captures(name)?;
    Some(DatasetVersion {
        major: caps[1].parse().ok()?,
        minor: caps[2].parse().ok()?,
    })
}

/// The snapshot a cleaning run reads and the one it writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPlan {
    pub input: DatasetVersion,
    pub output: DatasetVersion,
}

/// Picks versions from the snapshots present in a category directory.
///
/// The major version is the pinned one or the highest present. Output is
/// the next minor after the highest minor of that major; input is the
/// pinned minor, or that highest minor. `None` when nothing exists for the
/// chosen major.
pub fn plan_versions(
    existing: &[DatasetVersion],
    major: Option<u32>,
    minor: Option<u32>,
) -> Option<VersionPlan> {
    let major = major.or_else(|| existing.iter().map(|v| v.major).max())?;
    let highest_minor = existing
        .iter()
        .filter(|v| v.major == major)
        .map(|v| v.minor)
        .max()?;

    Some(VersionPlan {
        input: DatasetVersion::new(major, minor.unwrap_or(highest_minor)),
        output: DatasetVersion::new(major, highest_minor + 1),
    })
}

/// Versions of every snapshot in `dir`; empty when `dir` does not exist.
pub fn scan_versions(dir: &Path) -> Result<Vec<DatasetVersion>, AppError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut versions = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        if let Some(version) = name.to_str().and_then(parse_snapshot_file_name) {
            versions.push(version);
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

/// Directory of a category under the dataset root.
pub fn category_dir(root: &Path, category: &str) -> PathBuf {
    root.join(sanitize_dir_name(category))
}

/// Makes a category name safe to use as a single path component.
pub fn sanitize_dir_name(name: &str) -> String {
    let safe_name = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>();

    let safe_name = safe_name.trim().trim_matches('.');
    if safe_name.is_empty() {
        "unnamed".to_string()
    } else {
        safe_name.to_string()
    }
}
