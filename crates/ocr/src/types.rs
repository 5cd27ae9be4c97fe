use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use snap_core::{EngineMode, OcrSettings, SegmentationMode};
use std::io::Cursor;

/// A recognized word and the engine's certainty in it (0–100).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenConfidence {
    pub token: String,
    pub confidence: f32,
}

impl TokenConfidence {
    pub fn new(token: impl Into<String>, confidence: f32) -> Self {
        Self {
            token: token.into(),
            confidence: confidence.clamp(0.0, 100.0),
        }
    }
}

/// Raw engine output for one image. Carries no field semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OcrResult {
    pub text: String,
    pub tokens: Vec<TokenConfidence>,
}

impl OcrResult {
    pub fn new(text: impl Into<String>, tokens: Vec<TokenConfidence>) -> Self {
        Self {
            text: text.into(),
            tokens,
        }
    }

    /// Text only, no per-token data (engines that do not report it).
    pub fn text_only(text: impl Into<String>) -> Self {
        Self::new(text, Vec::new())
    }

    /// Mean token confidence on a 0.0–1.0 scale, or `None` without token data.
    pub fn mean_confidence(&self) -> Option<f32> {
        if self.tokens.is_empty() {
            return None;
        }
        let sum: f32 = self.tokens.iter().map(|t| t.confidence).sum();
        Some(sum / self.tokens.len() as f32 / 100.0)
    }
}

/// Engine options for one extraction call. Passed explicitly, never global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrConfig {
    pub languages: Vec<String>,
    pub engine_mode: EngineMode,
    pub segmentation_mode: SegmentationMode,
    pub dpi: u32,
}

impl OcrConfig {
    /// Language codes in the `eng+vie` form Tesseract expects.
    pub fn language_spec(&self) -> String {
        self.languages.join("+")
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from(&OcrSettings::default())
    }
}

impl From<&OcrSettings> for OcrConfig {
    fn from(s: &OcrSettings) -> Self {
        Self {
            languages: s.languages(),
            engine_mode: s.oem,
            segmentation_mode: s.psm,
            dpi: s.dpi,
        }
    }
}

/// A decoded, validated, optionally normalized image ready for OCR.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub image: DynamicImage,
    /// Format the input was sniffed as.
    pub source_format: ImageFormat,
    /// Resolution the pixels were normalized toward.
    pub dpi: u32,
}

impl PreparedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Lossless PNG encoding, the form OCR engines take from memory.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(buf)
    }
}
