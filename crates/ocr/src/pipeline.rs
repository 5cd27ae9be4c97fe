use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use snap_core::{AppConfig, BatchResult, TransactionRecord};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinError;

use crate::extract::FieldParser;
use crate::preprocess::{ImagePreprocessor, InvalidImage};
use crate::recognizer::{OcrError, TextExtractor};
use crate::types::OcrConfig;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] InvalidImage),
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl From<JoinError> for PipelineError {
    fn from(e: JoinError) -> Self {
        if e.is_panic() {
            PipelineError::Worker("panicked while processing image".to_string())
        } else {
            PipelineError::Worker(e.to_string())
        }
    }
}

/// Everything one image needs, shared read-only across tasks.
struct Stages {
    preprocessor: ImagePreprocessor,
    extractor: TextExtractor,
    parser: FieldParser,
    ocr_config: OcrConfig,
    /// Present when the backend must not run concurrently.
    engine_gate: Option<Arc<Mutex<()>>>,
}

/// Orchestrates: preprocess → OCR → parse, for every image of a batch.
///
/// Images are independent: a failure in one is recorded and the batch moves
/// on. Records and failures come back in input order whatever the
/// concurrency.
pub struct BatchOrchestrator {
    stages: Arc<Stages>,
    concurrency: usize,
    timeout: Duration,
}

impl BatchOrchestrator {
    pub fn new(
        preprocessor: ImagePreprocessor,
        extractor: TextExtractor,
        parser: FieldParser,
        ocr_config: OcrConfig,
    ) -> Self {
        let engine_gate = (!extractor.is_concurrent()).then(|| Arc::new(Mutex::new(())));
        Self {
            stages: Arc::new(Stages {
                preprocessor,
                extractor,
                parser,
                ocr_config,
                engine_gate,
            }),
            concurrency: 1,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &AppConfig, extractor: TextExtractor) -> Self {
        Self::new(
            ImagePreprocessor::from_config(config),
            extractor,
            FieldParser::from_config(config),
            OcrConfig::from(&config.ocr),
        )
        .with_concurrency(config.concurrency)
        .with_timeout(Duration::from_secs(config.ocr.timeout_secs))
    }

    /// Images in flight at once; clamped to at least one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Limit on a single OCR call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Process one image end to end.
    pub async fn process_file(&self, path: &Path) -> Result<TransactionRecord, PipelineError> {
        process_path(self.stages.clone(), path.to_path_buf(), self.timeout).await
    }

    /// Process every path; never fails as a whole.
    pub async fn run(&self, paths: &[PathBuf]) -> BatchResult {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let handles: Vec<_> = paths
            .iter()
            .cloned()
            .map(|path| {
                let stages = self.stages.clone();
                let permits = permits.clone();
                let timeout = self.timeout;
                tokio::spawn(async move {
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await.ok();
                    process_path(stages, path, timeout).await
                })
            })
            .collect();

        let mut batch = BatchResult::new();
        for (path, handle) in paths.iter().zip(handles) {
            let source = source_name(path);
            match handle.await.map_err(PipelineError::from).and_then(|r| r) {
                Ok(record) => {
                    tracing::debug!(
                        "{source}: ok ({} fields, confidence {:.2})",
                        record.fields().found_count(),
                        record.confidence()
                    );
                    batch.push_record(record);
                }
                Err(e) => {
                    tracing::debug!("{source}: failed: {e}");
                    batch.push_failure(source, e.to_string());
                }
            }
        }
        tracing::info!(
            "Processed {} image(s): {} record(s), {} failure(s)",
            batch.processed(),
            batch.records().len(),
            batch.failures().len()
        );
        batch
    }
}

fn source_name(path: &Path) -> String {
    path.display().to_string()
}

async fn process_path(
    stages: Arc<Stages>,
    path: PathBuf,
    timeout: Duration,
) -> Result<TransactionRecord, PipelineError> {
    let source = source_name(&path);
    tracing::debug!("{source}: preprocessing");

    let image = {
        let stages = stages.clone();
        tokio::task::spawn_blocking(move || stages.preprocessor.prepare_file(&path)).await??
    };

    // Held by the blocking call itself, so a timed-out call keeps the engine
    // until it really returns.
    let gate = match &stages.engine_gate {
        Some(gate) => Some(gate.clone().lock_owned().await),
        None => None,
    };

    tracing::debug!("{source}: running OCR");
    let ocr = {
        let stages = stages.clone();
        tokio::task::spawn_blocking(move || {
            let _gate = gate;
            stages.extractor.extract(&image, &stages.ocr_config)
        })
    };
    let ocr = match tokio::time::timeout(timeout, ocr).await {
        Ok(joined) => joined??,
        Err(_) => return Err(OcrError::Timeout(timeout).into()),
    };

    Ok(stages.parser.parse(&ocr, &source))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
