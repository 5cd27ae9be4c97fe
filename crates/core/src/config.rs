use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "snap-transact.toml";

const ENV_PREFIX: &str = "SNAP_TRANSACT_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

// ── OCR engine options ────────────────────────────────────────────────────────

/// Which recognizer the OCR engine runs (Tesseract `--oem`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EngineMode {
    Legacy,
    NeuralNet,
    Combined,
    Default,
}

impl TryFrom<u8> for EngineMode {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(EngineMode::Legacy),
            1 => Ok(EngineMode::NeuralNet),
            2 => Ok(EngineMode::Combined),
            3 => Ok(EngineMode::Default),
            other => Err(format!("unknown engine mode {other} (expected 0-3)")),
        }
    }
}

impl From<EngineMode> for u8 {
    fn from(m: EngineMode) -> u8 {
        match m {
            EngineMode::Legacy => 0,
            EngineMode::NeuralNet => 1,
            EngineMode::Combined => 2,
            EngineMode::Default => 3,
        }
    }
}

/// Layout assumption handed to the OCR engine (Tesseract `--psm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SegmentationMode {
    Auto,
    Block,
    Line,
    Word,
    Sparse,
}

impl TryFrom<u8> for SegmentationMode {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            3 => Ok(SegmentationMode::Auto),
            6 => Ok(SegmentationMode::Block),
            7 => Ok(SegmentationMode::Line),
            8 => Ok(SegmentationMode::Word),
            11 => Ok(SegmentationMode::Sparse),
            other => Err(format!(
                "unsupported segmentation mode {other} (expected 3, 6, 7, 8 or 11)"
            )),
        }
    }
}

impl From<SegmentationMode> for u8 {
    fn from(m: SegmentationMode) -> u8 {
        match m {
            SegmentationMode::Auto => 3,
            SegmentationMode::Block => 6,
            SegmentationMode::Line => 7,
            SegmentationMode::Word => 8,
            SegmentationMode::Sparse => 11,
        }
    }
}

/// How an amount with a single ambiguous separator (`1.500`, `1,500`) is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountLocale {
    /// `1.500.000,50`: Vietnamese and most of continental Europe.
    #[default]
    DotThousands,
    /// `1,500,000.50`: US / UK.
    CommaThousands,
}

impl AmountLocale {
    pub fn thousands_separator(self) -> char {
        match self {
            AmountLocale::DotThousands => '.',
            AmountLocale::CommaThousands => ',',
        }
    }
}

impl fmt::Display for AmountLocale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountLocale::DotThousands => write!(f, "dot_thousands"),
            AmountLocale::CommaThousands => write!(f, "comma_thousands"),
        }
    }
}

impl std::str::FromStr for AmountLocale {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dot_thousands" => Ok(AmountLocale::DotThousands),
            "comma_thousands" => Ok(AmountLocale::CommaThousands),
            other => Err(format!("unknown amount locale: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Tesseract language codes joined with `+`.
    pub language: String,
    pub oem: EngineMode,
    pub psm: SegmentationMode,
    pub dpi: u32,
    pub preprocess: bool,
    pub binarize: bool,
    pub timeout_secs: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng+vie".to_string(),
            oem: EngineMode::NeuralNet,
            psm: SegmentationMode::Block,
            dpi: 300,
            preprocess: true,
            binarize: true,
            timeout_secs: 60,
        }
    }
}

impl OcrSettings {
    pub fn languages(&self) -> Vec<String> {
        self.language
            .split('+')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Extra keyword → category mapping supplied by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub category: String,
    pub keywords: Vec<String>,
}

/// Immutable options bundle for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub supported_formats: Vec<String>,
    pub max_image_size: u64,
    pub amount_locale: AmountLocale,
    pub concurrency: usize,
    pub log_level: String,
    pub ocr: OcrSettings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supported_formats: [".png", ".jpg", ".jpeg", ".tiff", ".bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_image_size: 10_000_000,
            amount_locale: AmountLocale::default(),
            concurrency: 1,
            log_level: "info".to_string(),
            ocr: OcrSettings::default(),
            categories: Vec::new(),
        }
    }
}

impl AppConfig {
    /// File (explicit path, or `snap-transact.toml` if present) → env → validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
            Some(p) => Self::from_file(p)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)?
                } else {
                    tracing::debug!("no config file, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&s)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `SNAP_TRANSACT_*` overrides. Unrelated variables are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "OCR_LANGUAGE" => self.ocr.language = value,
                "OCR_OEM" => {
                    self.ocr.oem = parse_u8(&key, &value)?
                        .try_into()
                        .map_err(|e: String| invalid(&key, e))?
                }
                "OCR_PSM" => {
                    self.ocr.psm = parse_u8(&key, &value)?
                        .try_into()
                        .map_err(|e: String| invalid(&key, e))?
                }
                "OCR_DPI" => self.ocr.dpi = parse_num(&key, &value)?,
                "OCR_PREPROCESS" => self.ocr.preprocess = parse_bool(&key, &value)?,
                "MAX_IMAGE_SIZE" => self.max_image_size = parse_num(&key, &value)?,
                "CONCURRENCY" => self.concurrency = parse_num(&key, &value)?,
                "LOG_LEVEL" => self.log_level = value,
                _ => tracing::debug!("ignoring unknown override {key}"),
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ocr.languages().is_empty() {
            return Err(invalid("ocr.language", "at least one language is required"));
        }
        if self.ocr.dpi == 0 {
            return Err(invalid("ocr.dpi", "must be positive"));
        }
        if self.ocr.timeout_secs == 0 {
            return Err(invalid("ocr.timeout_secs", "must be positive"));
        }
        if self.max_image_size == 0 {
            return Err(invalid("max_image_size", "must be positive"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        if self.supported_formats.is_empty() {
            return Err(invalid("supported_formats", "must not be empty"));
        }
        if let Some(bad) = self.supported_formats.iter().find(|f| !f.starts_with('.')) {
            return Err(invalid(
                "supported_formats",
                format!("'{bad}' must be an extension starting with '.'"),
            ));
        }
        if let Some(c) = self.categories.iter().find(|c| c.keywords.is_empty()) {
            return Err(invalid(
                "categories",
                format!("category '{}' has no keywords", c.category),
            ));
        }
        Ok(())
    }

    /// Case-insensitive check of a file extension (`png`, `.PNG`).
    pub fn is_supported_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_lowercase();
        self.supported_formats
            .iter()
            .any(|f| f.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    parse_num(key, value)
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(key, format!("'{value}' is not a number")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, format!("'{value}' is not a boolean"))),
    }
}
