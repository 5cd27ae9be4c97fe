use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::{OcrConfig, OcrResult, PreparedImage, TokenConfidence};

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image encode error: {0}")]
    ImageEncode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("OCR language data unavailable for '{0}'")]
    MissingLanguage(String),
    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),
    #[error("Tesseract not available (build with the `tesseract` feature)")]
    NotAvailable,
}

/// Abstraction over an OCR engine.
/// Implementations turn pixels into text plus per-token confidence, nothing more.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &PreparedImage, config: &OcrConfig) -> Result<OcrResult, OcrError>;

    /// Whether `recognize` may run on several threads at once.
    fn is_concurrent(&self) -> bool {
        true
    }
}

/// Runs a backend and tidies its output. Shared across images; holds no
/// per-image state.
#[derive(Clone)]
pub struct TextExtractor {
    backend: Arc<dyn OcrBackend>,
}

impl TextExtractor {
    pub fn new(backend: impl OcrBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn OcrBackend>) -> Self {
        Self { backend }
    }

    pub fn is_concurrent(&self) -> bool {
        self.backend.is_concurrent()
    }

    pub fn extract(&self, image: &PreparedImage, config: &OcrConfig) -> Result<OcrResult, OcrError> {
        let raw = self.backend.recognize(image, config)?;
        let tokens: Vec<TokenConfidence> = raw
            .tokens
            .into_iter()
            .filter(|t| !t.token.trim().is_empty())
            .collect();
        let result = OcrResult::new(raw.text.trim(), tokens);
        tracing::debug!(
            "Extracted {} chars, {} tokens, mean confidence {:?}",
            result.text.len(),
            result.tokens.len(),
            result.mean_confidence()
        );
        Ok(result)
    }
}

/// Word-level tokens from Tesseract TSV output.
///
/// Columns: level page block par line word left top width height conf text.
/// Only level-5 (word) rows with a non-negative confidence are kept.
pub fn tokens_from_tsv(tsv: &str) -> Vec<TokenConfidence> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let conf: f32 = cols[10].trim().parse().ok()?;
            let text = cols[11].trim();
            if conf < 0.0 || text.is_empty() {
                return None;
            }
            Some(TokenConfidence::new(text, conf))
        })
        .collect()
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string, for exercising the pipeline
/// without Tesseract installed.
pub struct MockRecognizer {
    pub text: String,
    /// When set, every whitespace-separated word becomes a token with this confidence.
    pub token_confidence: Option<f32>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token_confidence: None,
        }
    }

    pub fn with_token_confidence(mut self, confidence: f32) -> Self {
        self.token_confidence = Some(confidence);
        self
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image: &PreparedImage, _config: &OcrConfig) -> Result<OcrResult, OcrError> {
        let tokens = match self.token_confidence {
            Some(conf) => self
                .text
                .split_whitespace()
                .map(|w| TokenConfidence::new(w, conf))
                .collect(),
            None => Vec::new(),
        };
        Ok(OcrResult::new(self.text.clone(), tokens))
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{tokens_from_tsv, OcrBackend, OcrError};
    use crate::types::{OcrConfig, OcrResult, PreparedImage};
    use leptess::{LepTess, Variable};

    /// A fresh engine per call, so calls never share engine state.
    pub struct TesseractRecognizer {
        data_path: Option<String>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>) -> Self {
            Self { data_path }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image: &PreparedImage, config: &OcrConfig) -> Result<OcrResult, OcrError> {
            let lang = config.language_spec();
            let mut lt = LepTess::new(self.data_path.as_deref(), &lang)
                .map_err(|e| OcrError::MissingLanguage(format!("{lang}: {e}")))?;

            let psm = u8::from(config.segmentation_mode).to_string();
            lt.set_variable(Variable::TesseditPagesegMode, &psm)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            let oem = u8::from(config.engine_mode).to_string();
            lt.set_variable(Variable::TesseditOcrEngineMode, &oem)
                .map_err(|e| OcrError::Engine(e.to_string()))?;

            let png = image
                .to_png()
                .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            // Must follow set_image.
            lt.set_source_resolution(config.dpi as i32);

            let text = lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))?;
            let tsv = lt.get_tsv_text(0).map_err(|e| OcrError::Engine(e.to_string()))?;
            Ok(OcrResult::new(text, tokens_from_tsv(&tsv)))
        }
    }
}
