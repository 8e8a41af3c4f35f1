//! Dragoman CLI entry point.

use clap::Parser;

use dragoman::cli::{Cli, Commands};
use dragoman::infrastructure::config::ConfigLoader;
use dragoman::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.config.as_ref() {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => dragoman::cli::handle_error(&err, cli.json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => dragoman::cli::handle_error(&err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => dragoman::cli::commands::init::execute(args, cli.json).await,
        Commands::Translate(args) => {
            dragoman::cli::commands::translate::execute(args, &config, cli.json).await
        }
        Commands::Runtime(args) => {
            dragoman::cli::commands::runtime::execute(args, &config, cli.json).await
        }
    };

    if let Err(err) = result {
        dragoman::cli::handle_error(&err, cli.json);
    }
}
