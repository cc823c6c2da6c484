// src/output/writer.rs
//! Executes output operations by performing actual I/O.
//!
//! This module and the journal are the only places where dataset files are
//! written.

use super::types::*;
use crate::error::AppError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Delivers the output plan, performing all I/O operations.
///
/// Operations are independent: a failed one is reported and the rest still
/// run, except that a copy whose source failed to write is skipped.
pub fn deliver(plan: OutputPlan) -> Result<OutputReport, AppError> {
    let mut report = OutputReport::new();
    let start_time = Instant::now();

    log::info!(
        "Executing output plan with {} operations",
        plan.operations.len()
    );

    for operation in plan.operations {
        if let DeliveryTarget::CopyFile { from, .. } = &operation {
            let source_failed = report.failed.iter().any(|f| {
                matches!(&f.operation, DeliveryTarget::WriteFile { path, .. } if path == from)
            });
            if source_failed {
                report = report.with_failed(FailedOperation {
                    error: format!("source {} was not written", from.display()),
                    operation,
                });
                continue;
            }
        }

        let op_start = Instant::now();
        match execute_operation(&operation) {
            Ok(bytes_written) => {
                let duration_ms = op_start.elapsed().as_millis() as u64;
                report = report.with_completed(CompletedOperation {
                    operation,
                    bytes_written,
                    duration_ms,
                });
            }
            Err(e) => {
                log::error!("Operation failed: {}", e);
                report = report.with_failed(FailedOperation {
                    operation,
                    error: e.to_string(),
                });
            }
        }
    }

    report.stats.total_duration_ms = start_time.elapsed().as_millis() as u64;

    log::info!(
        "Output plan execution complete: {} succeeded, {} failed in {}ms",
        report.stats.operations_completed,
        report.stats.operations_failed,
        report.stats.total_duration_ms
    );

    Ok(report)
}

fn execute_operation(operation: &DeliveryTarget) -> Result<usize, AppError> {
    match operation {
        DeliveryTarget::WriteFile { path, content } => {
            replace_file(path, content.as_bytes())?;
            log::info!("Wrote file: {}", path.display());
            Ok(content.len())
        }
        DeliveryTarget::CopyFile { from, to } => {
            let content = fs::read(from)?;
            replace_file(to, &content)?;
            log::info!("Copied {} to {}", from.display(), to.display());
            Ok(content.len())
        }
        DeliveryTarget::ResetDir { path } => {
            match fs::remove_dir_all(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            fs::create_dir_all(path)?;
            log::info!("Reset directory: {}", path.display());
            Ok(0)
        }
        DeliveryTarget::PrintToStdout { content } => {
            print!("{}", content);
            std::io::stdout().flush()?;
            Ok(content.len())
        }
    }
}

/// Writes through a scratch file in the same directory and renames it into
/// place, so readers never see a partial file.
fn replace_file(path: &Path, content: &[u8]) -> Result<(), AppError> {
    log::debug!("Writing {} bytes to {}", content.len(), path.display());
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let scratch = scratch_path(parent);
    let result = fs::write(&scratch, content).and_then(|_| fs::rename(&scratch, path));
    if result.is_err() {
        let _ = fs::remove_file(&scratch);
    }
    Ok(result?)
}

fn scratch_path(dir: &Path) -> PathBuf {
    dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()))
}
