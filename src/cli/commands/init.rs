//! `init` command: write the default project configuration.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::domain::models::Config;

const CONFIG_DIR: &str = ".dragoman";
const CONFIG_FILE: &str = ".dragoman/config.yaml";

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration
    #[arg(long)]
    pub force: bool,
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let path = Path::new(CONFIG_FILE);
    if path.exists() && !args.force {
        bail!("{CONFIG_FILE} already exists (use --force to overwrite)");
    }

    tokio::fs::create_dir_all(CONFIG_DIR)
        .await
        .context("failed to create .dragoman directory")?;

    let rendered =
        serde_yaml::to_string(&Config::default()).context("failed to render default config")?;
    tokio::fs::write(path, rendered)
        .await
        .with_context(|| format!("failed to write {CONFIG_FILE}"))?;

    if json_mode {
        println!("{}", serde_json::json!({ "written": CONFIG_FILE }));
    } else {
        println!("Wrote {CONFIG_FILE}");
    }
    Ok(())
}
