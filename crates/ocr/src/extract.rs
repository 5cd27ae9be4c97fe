use std::ops::Range;

use snap_core::{AmountLocale, AppConfig, RecordFields, TransactionRecord};

use crate::amount::{AMOUNT_RULES, BALANCE_RULES};
use crate::category::CategoryTable;
use crate::rules::{
    first_match, FieldRule, RuleContext, ACCOUNT_RULES, DATE_RULES, DESCRIPTION_RULES,
    REFERENCE_RULES,
};
use crate::types::OcrResult;

const COVERAGE_WEIGHT: f32 = 0.6;
const OCR_WEIGHT: f32 = 0.4;

// ── Public parsing API ───────────────────────────────────────────────────────

/// Turns OCR text into a [`TransactionRecord`]. Pure: no I/O, no engine calls.
pub struct FieldParser {
    locale: AmountLocale,
    categories: CategoryTable,
}

impl FieldParser {
    pub fn new(locale: AmountLocale, categories: CategoryTable) -> Self {
        Self { locale, categories }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.amount_locale, CategoryTable::new(&config.categories))
    }

    /// Parse every field out of `ocr`.
    ///
    /// Fields are read in a fixed order (date, reference, account, amount,
    /// balance, description) and each one only sees text the earlier ones did
    /// not claim. The category is looked up from the description. Missing
    /// fields stay `None`; this never fails.
    pub fn parse(&self, ocr: &OcrResult, source_file: &str) -> TransactionRecord {
        let text = ocr.text.as_str();
        if text.trim().is_empty() {
            return TransactionRecord::empty(source_file, text);
        }

        let mut spans: Vec<Range<usize>> = Vec::new();
        let date = self.field("date", DATE_RULES, text, &mut spans);
        let reference = self.field("reference", REFERENCE_RULES, text, &mut spans);
        let account = self.field("account", ACCOUNT_RULES, text, &mut spans);
        let amount = self.field("amount", AMOUNT_RULES, text, &mut spans);
        let balance = self.field("balance", BALANCE_RULES, text, &mut spans);
        let description = self.field("description", DESCRIPTION_RULES, text, &mut spans);
        let category = description
            .as_deref()
            .and_then(|d| self.categories.classify(d))
            .map(str::to_string);

        let fields = RecordFields {
            date,
            amount,
            description,
            account,
            category,
            reference,
            balance,
        };
        let confidence = score(&fields, ocr, &spans);
        tracing::debug!(
            "{source_file}: {}/{} fields, confidence {confidence:.2}",
            fields.found_count(),
            RecordFields::TARGET_COUNT
        );
        TransactionRecord::new(source_file, text, fields, confidence)
    }

    fn field<T>(
        &self,
        field: &str,
        rules: &[FieldRule<T>],
        text: &str,
        spans: &mut Vec<Range<usize>>,
    ) -> Option<T> {
        let ctx = RuleContext::new(self.locale, spans.as_slice());
        let (rule, m) = first_match(rules, text, &ctx)?;
        tracing::trace!("{field} matched by rule '{rule}' at {:?}", m.span);
        spans.push(m.span);
        Some(m.value)
    }
}

impl Default for FieldParser {
    fn default() -> Self {
        Self::new(AmountLocale::default(), CategoryTable::builtin())
    }
}

// ── Confidence ───────────────────────────────────────────────────────────────

/// Blend of how many fields were found and how sure the engine was about the
/// words they came from. Without token data only the field coverage counts.
fn score(fields: &RecordFields, ocr: &OcrResult, spans: &[Range<usize>]) -> f32 {
    let found = fields.found_count();
    if found == 0 {
        return 0.0;
    }
    let coverage = found as f32 / RecordFields::TARGET_COUNT as f32;
    match span_token_confidence(ocr, spans) {
        Some(engine) => COVERAGE_WEIGHT * coverage + OCR_WEIGHT * engine,
        None => coverage,
    }
}

/// Mean confidence (0–1) of the tokens overlapping any used span. Tokens are
/// located in the text left to right; ones that cannot be found are skipped.
fn span_token_confidence(ocr: &OcrResult, spans: &[Range<usize>]) -> Option<f32> {
    let text = ocr.text.as_str();
    let mut cursor = 0;
    let mut sum = 0.0f32;
    let mut n = 0usize;
    for token in &ocr.tokens {
        let Some(pos) = text[cursor..].find(token.token.as_str()) else {
            continue;
        };
        let start = cursor + pos;
        let end = start + token.token.len();
        cursor = end;
        if spans.iter().any(|s| s.start < end && start < s.end) {
            sum += token.confidence;
            n += 1;
        }
    }
    (n > 0).then(|| sum / n as f32 / 100.0)
}
