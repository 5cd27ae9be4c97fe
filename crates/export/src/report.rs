use chrono::{DateTime, Utc};
use serde::Serialize;
use snap_core::{BatchFailure, BatchResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::ExportError;

/// Machine-readable account of what a run could not process.
#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub processed: usize,
    pub succeeded: usize,
    pub failures: &'a [BatchFailure],
}

impl<'a> FailureReport<'a> {
    pub fn from_batch(batch: &'a BatchResult) -> Self {
        Self {
            generated_at: Utc::now(),
            processed: batch.processed(),
            succeeded: batch.records().len(),
            failures: batch.failures(),
        }
    }
}

/// Emit one warning per failed image.
pub fn log_failures(failures: &[BatchFailure]) {
    for f in failures {
        tracing::warn!("Failed to process {}: {}", f.source_file, f.error);
    }
}

pub fn write_failure_report<W: Write>(writer: W, batch: &BatchResult) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, &FailureReport::from_batch(batch))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write the JSON failure report to `path`, creating parent directories.
pub fn export_failure_report(path: &Path, batch: &BatchResult) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_failure_report(File::create(path)?, batch)?;
    tracing::info!(
        "Wrote failure report ({} failure(s)) to {}",
        batch.failures().len(),
        path.display()
    );
    Ok(())
}
