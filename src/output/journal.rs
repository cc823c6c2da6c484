// src/output/journal.rs
//! JSON-lines journal of records as they complete.

use crate::error::AppError;
use crate::model::CleanedRecord;
use crate::pipeline::RecordSink;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Routes each record to its category's journal file.
///
/// Files are truncated when the writer first opens them, so re-running a
/// version (after an abort) replaces its partial journal instead of adding a
/// second record per candidate. Each record is flushed once written so an
/// interrupted run keeps everything it finished.
pub struct JournalWriter {
    paths: HashMap<String, PathBuf>,
    open: HashMap<String, BufWriter<File>>,
    written: usize,
}

impl JournalWriter {
    pub fn new(paths: HashMap<String, PathBuf>) -> Self {
        Self {
            paths,
            open: HashMap::new(),
            written: 0,
        }
    }

    pub fn records_written(&self) -> usize {
        self.written
    }

    fn writer_for(&mut self, category: &str) -> Result<&mut BufWriter<File>, AppError> {
        if !self.open.contains_key(category) {
            let path = self.paths.get(category).ok_or_else(|| {
                AppError::internal(format!("no journal configured for category {:?}", category))
            })?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            log::debug!("Journaling {} records to {}", category, path.display());
            self.open.insert(category.to_string(), BufWriter::new(file));
        }
        self.open
            .get_mut(category)
            .ok_or_else(|| AppError::internal("journal writer vanished"))
    }
}

impl RecordSink for JournalWriter {
    fn append(&mut self, record: &CleanedRecord) -> Result<(), AppError> {
        let line = serde_json::to_string(record)?;
        let writer = self.writer_for(&record.category)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AppError> {
        for writer in self.open.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Reads a journal back; malformed lines are skipped with a warning.
pub fn read_journal(path: &std::path::Path) -> Result<Vec<CleanedRecord>, AppError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    Ok(text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Skipping journal line {} of {}: {}", i + 1, path.display(), e);
                None
            }
        })
        .collect())
}
