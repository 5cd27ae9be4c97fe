pub mod csv;
pub mod report;

use thiserror::Error;

pub use self::csv::{export_csv, read_csv, write_csv, CsvRow, COLUMNS};
pub use self::report::{export_failure_report, log_failures, write_failure_report, FailureReport};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
