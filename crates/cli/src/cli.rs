use clap::{Args, Parser, Subcommand};
use snap_core::AppConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "snap-transact",
    version,
    about = "Extract bank transactions from screenshots into CSV"
)]
pub struct Cli {
    /// Configuration file (default: ./snap-transact.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a screenshot or a directory of screenshots
    Process(ProcessArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Image file or directory (not searched recursively)
    pub input: PathBuf,

    /// CSV file to write
    #[arg(short, long, default_value = "transactions.csv", value_name = "FILE")]
    pub output: PathBuf,

    /// Also write failed images and their causes as JSON
    #[arg(long, value_name = "FILE")]
    pub failures: Option<PathBuf>,

    /// Images processed at once
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// OCR languages, e.g. "eng+vie"
    #[arg(short, long)]
    pub language: Option<String>,

    /// Skip image normalization before OCR
    #[arg(long)]
    pub no_preprocess: bool,

    /// Directory holding Tesseract language data
    #[arg(long, value_name = "DIR")]
    pub tessdata: Option<PathBuf>,
}

impl ProcessArgs {
    /// Flags win over file and environment settings.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(lang) = &self.language {
            config.ocr.language = lang.clone();
        }
        if self.no_preprocess {
            config.ocr.preprocess = false;
        }
    }
}
