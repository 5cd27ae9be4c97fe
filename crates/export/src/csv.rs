use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use snap_core::TransactionRecord;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use crate::ExportError;

/// Column order of the exported file.
pub const COLUMNS: [&str; 9] = [
    "date",
    "amount",
    "description",
    "account",
    "category",
    "reference",
    "balance",
    "source_file",
    "confidence",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One CSV line. Everything is pre-formatted text; missing values are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsvRow {
    pub date: String,
    pub amount: String,
    pub description: String,
    pub account: String,
    pub category: String,
    pub reference: String,
    pub balance: String,
    pub source_file: String,
    pub confidence: String,
}

impl From<&TransactionRecord> for CsvRow {
    fn from(r: &TransactionRecord) -> Self {
        let text = |v: Option<&str>| v.unwrap_or_default().to_string();
        let decimal = |v: Option<Decimal>| v.map(|d| d.to_string()).unwrap_or_default();
        Self {
            date: r
                .date()
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            amount: decimal(r.amount()),
            description: text(r.description()),
            account: text(r.account()),
            category: text(r.category()),
            reference: text(r.reference()),
            balance: decimal(r.balance()),
            source_file: r.source_file().to_string(),
            confidence: format!("{:.2}", r.confidence()),
        }
    }
}

impl CsvRow {
    pub fn date(&self) -> Result<Option<NaiveDate>, ExportError> {
        if self.date.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map(Some)
            .map_err(|_| ExportError::InvalidValue(format!("date '{}'", self.date)))
    }

    pub fn amount(&self) -> Result<Option<Decimal>, ExportError> {
        parse_decimal(&self.amount)
    }

    pub fn balance(&self) -> Result<Option<Decimal>, ExportError> {
        parse_decimal(&self.balance)
    }
}

fn parse_decimal(s: &str) -> Result<Option<Decimal>, ExportError> {
    if s.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(s)
        .map(Some)
        .map_err(|_| ExportError::InvalidValue(format!("decimal '{s}'")))
}

/// Write `records` as CSV. The header is written even when there are no rows.
pub fn write_csv<W: Write>(writer: W, records: &[TransactionRecord]) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(COLUMNS)?;
    for record in records {
        wtr.serialize(CsvRow::from(record))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write `records` to `path`, creating parent directories as needed.
/// Returns the number of data rows written.
pub fn export_csv(path: &Path, records: &[TransactionRecord]) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_csv(file, records)?;
    tracing::info!("Wrote {} record(s) to {}", records.len(), path.display());
    Ok(records.len())
}

/// Read back a file produced by [`write_csv`].
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<CsvRow>, ExportError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.iter().ne(COLUMNS) {
        return Err(ExportError::InvalidValue(format!(
            "unexpected header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snap_core::RecordFields;

    fn record() -> TransactionRecord {
        let fields = RecordFields {
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            amount: Decimal::from_str("-1500000.50").ok(),
            description: Some("Tien an, trua \"quan\"".into()),
            account: Some("****6789".into()),
            category: Some("Food & Drink".into()),
            reference: Some("FT24075ABC12".into()),
            balance: Decimal::from_str("10000000").ok(),
        };
        TransactionRecord::new("shots/a.png", "raw", fields, 0.876)
    }

    fn written(records: &[TransactionRecord]) -> String {
        let mut buf = Vec::new();
        write_csv(&mut buf, records).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_and_formatting() {
        let out = written(&[record()]);
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("date,amount,description,account,category,reference,balance,source_file,confidence")
        );
        assert_eq!(
            lines.next(),
            Some("2024-03-15,-1500000.50,\"Tien an, trua \"\"quan\"\"\",****6789,Food & Drink,FT24075ABC12,10000000,shots/a.png,0.88")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn missing_values_are_empty() {
        let r = TransactionRecord::empty("b.png", "");
        let out = written(&[r]);
        assert_eq!(out.lines().nth(1), Some(",,,,,,,b.png,0.00"));
    }

    #[test]
    fn no_records_still_writes_header() {
        let out = written(&[]);
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("date,amount"));
    }

    #[test]
    fn values_survive_a_round_trip() {
        let out = written(&[record()]);
        let rows = read_csv(out.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.date().unwrap(), NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(row.amount().unwrap(), Decimal::from_str("-1500000.50").ok());
        assert_eq!(row.balance().unwrap(), Decimal::from_str("10000000").ok());
        assert_eq!(row.description, "Tien an, trua \"quan\"");
    }

    #[test]
    fn foreign_header_is_rejected() {
        let err = read_csv("a,b\n1,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ExportError::InvalidValue(_)));
    }

    #[test]
    fn export_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/transactions.csv");
        let n = export_csv(&path, &[record(), record()]).unwrap();
        assert_eq!(n, 2);
        let rows = read_csv(File::open(&path).unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
    }
}
