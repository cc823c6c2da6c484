// src/pipeline.rs
//! Stage traits for the cleaning run: where candidates come from, where
//! records stream to while the run is in progress, and how the finished
//! snapshot is delivered.

use crate::error::AppError;
use crate::model::{Candidate, CleanedRecord};
use crate::output::OutputReport;

/// Supplies the candidates of one category.
pub trait CandidateSource {
    fn load(&self, category: &str) -> Result<Vec<Candidate>, AppError>;
}

/// Receives records as they complete, in completion order.
pub trait RecordSink: Send {
    fn append(&mut self, record: &CleanedRecord) -> Result<(), AppError>;

    fn flush(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

impl RecordSink for Vec<CleanedRecord> {
    fn append(&mut self, record: &CleanedRecord) -> Result<(), AppError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Persists the records of a completed run.
pub trait SnapshotDelivery {
    fn deliver(&self, records: &[CleanedRecord]) -> Result<OutputReport, AppError>;
}
