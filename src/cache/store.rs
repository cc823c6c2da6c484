// src/cache/store.rs
//! Append-only disk partitions, one directory per resource kind.
//!
//! Entries are written to a scratch file and published with a hard link.
//! Linking never replaces an existing file, so once a key is committed its
//! entry is immutable; a racing writer observes `AlreadyExists` and compares
//! fingerprints instead.

use crate::error::{AppError, Result};
use crate::model::{fingerprint, CacheEntry, CacheKey, ResourceKind};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const SCRATCH_DIR: &str = ".tmp";

/// Result of publishing an entry to disk.
#[derive(Debug)]
pub(crate) enum Publish {
    Committed,
    /// A committed entry exists for the key
    Existing(CacheEntry),
}

pub(crate) struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub async fn open(root: &Path) -> Result<Self> {
        for kind in ResourceKind::ALL {
            let partition = root.join(kind.partition_name());
            tokio::fs::create_dir_all(partition.join(SCRATCH_DIR)).await?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// `$XDG_CACHE_HOME/sitecurator`, or `~/.cache/sitecurator`.
    pub fn default_dir() -> PathBuf {
        std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".cache")
            })
            .join("sitecurator")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn read(&self, kind: ResourceKind, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(kind, key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry =
            serde_json::from_str(&content).map_err(|e| AppError::CacheCorrupted {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        if entry.key != *key || entry.resource_kind != kind {
            return Err(AppError::CacheCorrupted {
                path: path.display().to_string(),
                message: format!("entry belongs to {} key {}", entry.resource_kind, entry.key),
            });
        }
        if fingerprint(&entry.payload) != entry.fingerprint {
            return Err(AppError::CacheCorrupted {
                path: path.display().to_string(),
                message: "payload does not match its fingerprint".to_string(),
            });
        }

        Ok(Some(entry))
    }

    pub async fn publish(&self, entry: &CacheEntry) -> Result<Publish> {
        let target = self.entry_path(entry.resource_kind, &entry.key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let scratch = self
            .root
            .join(entry.resource_kind.partition_name())
            .join(SCRATCH_DIR)
            .join(format!("{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(&scratch, serde_json::to_vec(entry)?).await?;

        let linked = tokio::fs::hard_link(&scratch, &target).await;
        let _ = tokio::fs::remove_file(&scratch).await;

        match linked {
            Ok(()) => Ok(Publish::Committed),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                match self.read(entry.resource_kind, &entry.key).await? {
                    Some(existing) => Ok(Publish::Existing(existing)),
                    None => Err(AppError::internal(format!(
                        "{} entry {} vanished after link conflict",
                        entry.resource_kind, entry.key
                    ))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of committed entries in a partition.
    pub async fn count(&self, kind: ResourceKind) -> Result<usize> {
        let mut count = 0;
        let mut shards = tokio::fs::read_dir(self.root.join(kind.partition_name())).await?;
        while let Some(shard) = shards.next_entry().await? {
            if shard.file_name() == SCRATCH_DIR || !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                if file.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    fn entry_path(&self, kind: ResourceKind, key: &CacheKey) -> PathBuf {
        let hex = key.as_str();
        self.root
            .join(kind.partition_name())
            .join(&hex[..2])
            .join(format!("{}.json", hex))
    }
}
