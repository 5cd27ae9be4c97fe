pub mod batch;
pub mod config;
pub mod record;

pub use batch::{BatchFailure, BatchResult};
pub use config::{
    AmountLocale, AppConfig, CategoryConfig, ConfigError, EngineMode, OcrSettings,
    SegmentationMode,
};
pub use record::{RecordFields, TransactionRecord};
