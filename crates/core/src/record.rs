use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fields recovered from one screenshot. Every field is optional because
/// partial extraction is the normal case for noisy OCR output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub account: Option<String>,
    pub category: Option<String>,
    pub reference: Option<String>,
    pub balance: Option<Decimal>,
}

impl RecordFields {
    /// Number of fields the parser tries to recover.
    pub const TARGET_COUNT: usize = 7;

    pub fn found_count(&self) -> usize {
        [
            self.date.is_some(),
            self.amount.is_some(),
            self.description.is_some(),
            self.account.is_some(),
            self.category.is_some(),
            self.reference.is_some(),
            self.balance.is_some(),
        ]
        .iter()
        .filter(|found| **found)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.found_count() == 0
    }
}

/// The immutable result of parsing one image.
///
/// Construction goes through [`TransactionRecord::new`], which enforces that
/// the confidence is in `[0, 1]` and is zero exactly when no field was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    #[serde(flatten)]
    fields: RecordFields,
    source_file: String,
    confidence: f32,
    raw_text: String,
}

impl TransactionRecord {
    pub fn new(
        source_file: impl Into<String>,
        raw_text: impl Into<String>,
        fields: RecordFields,
        confidence: f32,
    ) -> Self {
        let confidence = if fields.is_empty() || !confidence.is_finite() {
            0.0
        } else {
            // A record with at least one field must never report zero.
            confidence.clamp(f32::EPSILON, 1.0)
        };
        Self {
            fields,
            source_file: source_file.into(),
            confidence,
            raw_text: raw_text.into(),
        }
    }

    /// A record carrying nothing but its provenance.
    pub fn empty(source_file: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self::new(source_file, raw_text, RecordFields::default(), 0.0)
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.fields.date
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.fields.amount
    }

    pub fn description(&self) -> Option<&str> {
        self.fields.description.as_deref()
    }

    pub fn account(&self) -> Option<&str> {
        self.fields.account.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.fields.category.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.fields.reference.as_deref()
    }

    pub fn balance(&self) -> Option<Decimal> {
        self.fields.balance
    }

    pub fn fields(&self) -> &RecordFields {
        &self.fields
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Whether the record is good enough to use without a human glance.
    pub fn needs_review(&self) -> bool {
        self.confidence < 0.7
    }
}
