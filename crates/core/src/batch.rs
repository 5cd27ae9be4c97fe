use serde::Serialize;

use crate::record::TransactionRecord;

/// One image that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub source_file: String,
    pub error: String,
}

/// Accumulated outcome of one batch run. Both lists keep input order.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    records: Vec<TransactionRecord>,
    failures: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_record(&mut self, record: TransactionRecord) {
        self.records.push(record);
    }

    pub fn push_failure(&mut self, source_file: impl Into<String>, error: impl Into<String>) {
        self.failures.push(BatchFailure {
            source_file: source_file.into(),
            error: error.into(),
        });
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn failures(&self) -> &[BatchFailure] {
        &self.failures
    }

    /// Images seen by the run, successful or not.
    pub fn processed(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    /// True when every image produced a record.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_parts(self) -> (Vec<TransactionRecord>, Vec<BatchFailure>) {
        (self.records, self.failures)
    }
}
