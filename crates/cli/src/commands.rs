use anyhow::{Context, Result};
use snap_core::AppConfig;
use snap_export::{export_csv, export_failure_report, log_failures};
use snap_ocr::{collect_image_files, BatchOrchestrator, TextExtractor};
use std::path::Path;

use crate::cli::ProcessArgs;

/// Exit status for a run that wrote its output but lost some images.
pub const EXIT_PARTIAL: u8 = 2;

/// What a `process` run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub processed: usize,
    pub written: usize,
    pub failed: usize,
}

impl Outcome {
    pub fn exit_status(&self) -> u8 {
        if self.failed == 0 {
            0
        } else {
            EXIT_PARTIAL
        }
    }
}

/// The OCR engine this binary was built with.
#[cfg(feature = "tesseract")]
pub fn default_extractor(tessdata: Option<&Path>) -> Result<TextExtractor> {
    use snap_ocr::recognizer::tesseract_backend::TesseractRecognizer;
    let data_path = tessdata.map(|p| p.display().to_string());
    Ok(TextExtractor::new(TesseractRecognizer::new(data_path)))
}

#[cfg(not(feature = "tesseract"))]
pub fn default_extractor(_tessdata: Option<&Path>) -> Result<TextExtractor> {
    Err(snap_ocr::OcrError::NotAvailable.into())
}

pub async fn process(
    config: &AppConfig,
    args: &ProcessArgs,
    extractor: TextExtractor,
) -> Result<Outcome> {
    let inputs = collect_image_files(&args.input, config)?;
    if inputs.is_empty() {
        tracing::warn!("No supported images in {}", args.input.display());
    }

    let batch = BatchOrchestrator::from_config(config, extractor)
        .run(&inputs)
        .await;
    log_failures(batch.failures());

    let written = export_csv(&args.output, batch.records())
        .with_context(|| format!("write {}", args.output.display()))?;
    if let Some(path) = &args.failures {
        export_failure_report(path, &batch)
            .with_context(|| format!("write {}", path.display()))?;
    }

    let review = batch.records().iter().filter(|r| r.needs_review()).count();
    if review > 0 {
        tracing::info!("{review} record(s) have low confidence and should be reviewed");
    }

    let outcome = Outcome {
        processed: batch.processed(),
        written,
        failed: batch.failures().len(),
    };
    eprintln!(
        "Extracted {} transaction(s) from {} image(s), {} failed; written to {}",
        outcome.written,
        outcome.processed,
        outcome.failed,
        args.output.display()
    );
    Ok(outcome)
}

pub fn show_config(config: &AppConfig) -> Result<String> {
    config.to_toml_string().context("serialize configuration")
}
