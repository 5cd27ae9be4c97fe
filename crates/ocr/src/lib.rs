// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static regex::Regex {
            static R: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            R.get_or_init(|| regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}

pub mod amount;
pub mod category;
pub mod extract;
pub mod intake;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod rules;
pub mod types;

pub use amount::normalize_amount;
pub use category::CategoryTable;
pub use extract::FieldParser;
pub use intake::{collect_image_files, IntakeError};
pub use pipeline::{BatchOrchestrator, PipelineError};
pub use preprocess::{ImagePreprocessor, InvalidImage, PrepareOptions};
pub use recognizer::{tokens_from_tsv, MockRecognizer, OcrBackend, OcrError, TextExtractor};
pub use rules::{FieldRule, Matched, RuleContext};
pub use types::{OcrConfig, OcrResult, PreparedImage, TokenConfidence};
