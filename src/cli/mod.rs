//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use output::{create_progress_bar, create_spinner};

#[derive(Parser, Debug)]
#[command(
    name = "dragoman",
    version,
    about = "Browser-driven bulk translation orchestrator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .dragoman/config.yaml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the default project configuration
    Init(commands::init::InitArgs),
    /// Translate a text file through the conversational surface
    Translate(commands::translate::TranslateArgs),
    /// Manage the controlled browser runtime
    Runtime(commands::runtime::RuntimeArgs),
}

/// Render a fatal error and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        eprintln!("{}", serde_json::json!({ "error": format!("{err:#}") }));
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1);
}
