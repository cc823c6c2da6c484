// src/output/types.rs
//! Type definitions for output operations.
//!
//! Delivery is planned as plain data first and executed by the writer, so
//! what a run will write can be inspected before any file is touched.

use std::path::PathBuf;

/// Represents a complete output plan.
#[derive(Debug, Clone, Default)]
pub struct OutputPlan {
    /// Operations in execution order
    pub operations: Vec<DeliveryTarget>,
}

impl OutputPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: DeliveryTarget) -> Self {
        self.operations.push(operation);
        self
    }
}

/// Represents a single output operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// Write content to a file, replacing it atomically
    WriteFile { path: PathBuf, content: String },
    /// Replace `to` with a copy of `from`
    CopyFile { from: PathBuf, to: PathBuf },
    /// Remove a directory and everything in it, then recreate it empty
    ResetDir { path: PathBuf },
    PrintToStdout { content: String },
}

/// Result of executing an output plan.
#[derive(Debug, Clone, Default)]
pub struct OutputReport {
    pub completed: Vec<CompletedOperation>,
    pub failed: Vec<FailedOperation>,
    pub stats: ExecutionStats,
}

impl OutputReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completed(mut self, operation: CompletedOperation) -> Self {
        self.stats.operations_completed += 1;
        self.stats.bytes_written += operation.bytes_written;
        self.completed.push(operation);
        self
    }

    pub fn with_failed(mut self, operation: FailedOperation) -> Self {
        self.stats.operations_failed += 1;
        self.failed.push(operation);
        self
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Paths of files written or copied.
    pub fn written_paths(&self) -> Vec<&PathBuf> {
        self.completed
            .iter()
            .filter_map(|op| match &op.operation {
                DeliveryTarget::WriteFile { path, .. } => Some(path),
                DeliveryTarget::CopyFile { to, .. } => Some(to),
                DeliveryTarget::ResetDir { .. } | DeliveryTarget::PrintToStdout { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CompletedOperation {
    pub operation: DeliveryTarget,
    pub bytes_written: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct FailedOperation {
    pub operation: DeliveryTarget,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub operations_completed: usize,
    pub operations_failed: usize,
    pub bytes_written: usize,
    pub total_duration_ms: u64,
}
