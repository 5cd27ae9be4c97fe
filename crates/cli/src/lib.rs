pub mod cli;
pub mod commands;
pub mod logging;

use anyhow::{Context, Result};
use snap_core::AppConfig;

use crate::cli::{Cli, Commands};

/// Load configuration, set up logging, dispatch. Returns the process exit
/// status on a completed run.
pub async fn run(cli: Cli) -> Result<u8> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("load configuration")?;
    logging::init(&config.log_level, cli.verbose);

    match cli.command {
        Commands::Process(args) => {
            args.apply(&mut config);
            config.validate().context("invalid command-line options")?;
            tracing::debug!("Effective configuration: {config:?}");
            let extractor = commands::default_extractor(args.tessdata.as_deref())?;
            let outcome = commands::process(&config, &args, extractor).await?;
            Ok(outcome.exit_status())
        }
        Commands::Config => {
            print!("{}", commands::show_config(&config)?);
            Ok(0)
        }
    }
}
