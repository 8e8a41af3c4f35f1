//! `runtime` commands: manage the controlled browser runtime.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use crate::adapters::NativeProcessControl;
use crate::application::RuntimeLifecycle;
use crate::cli::output::create_spinner;
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct RuntimeArgs {
    #[command(subcommand)]
    pub command: RuntimeCommand,
}

#[derive(Subcommand, Debug)]
pub enum RuntimeCommand {
    /// Install or update the runtime binary
    Install,
    /// Launch the runtime (installing first when needed)
    Launch {
        /// Run with a visible window instead of headless
        #[arg(long)]
        headed: bool,
    },
    /// Close the running runtime
    Close,
    /// Hard reinstall: kill lingering processes and delete the install
    Reset {
        /// Skip the confirmation requirement
        #[arg(long)]
        yes: bool,
    },
    /// Show installed version and update availability
    Status,
}

pub async fn execute(args: RuntimeArgs, config: &Config, json_mode: bool) -> Result<()> {
    let lifecycle = RuntimeLifecycle::new(
        Arc::new(NativeProcessControl::new()),
        config.runtime.clone(),
    );

    match args.command {
        RuntimeCommand::Install => install(&lifecycle, json_mode).await,
        RuntimeCommand::Launch { headed } => launch(&lifecycle, !headed, json_mode).await,
        RuntimeCommand::Close => {
            lifecycle.close().await;
            if json_mode {
                println!("{}", serde_json::json!({ "closed": true }));
            } else {
                println!("Runtime closed");
            }
            Ok(())
        }
        RuntimeCommand::Reset { yes } => reset(&lifecycle, yes, json_mode).await,
        RuntimeCommand::Status => status(&lifecycle, json_mode).await,
    }
}

async fn install(lifecycle: &RuntimeLifecycle, json_mode: bool) -> Result<()> {
    let spinner = (!json_mode).then(|| create_spinner("Checking runtime distribution"));
    let result = lifecycle
        .ensure_installed()
        .await
        .context("runtime install failed");
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    result?;

    let version = lifecycle
        .installed_version()
        .await
        .unwrap_or_else(|| "unknown".to_string());
    if json_mode {
        println!("{}", serde_json::json!({ "installed_version": version }));
    } else {
        println!("Runtime installed: {version}");
    }
    Ok(())
}

async fn launch(lifecycle: &RuntimeLifecycle, headless: bool, json_mode: bool) -> Result<()> {
    let handle = lifecycle
        .launch(headless)
        .await
        .context("runtime launch failed")?;
    if json_mode {
        println!(
            "{}",
            serde_json::json!({ "launched": handle.id, "pid": handle.pid, "headless": headless })
        );
    } else {
        println!("Launched {handle}");
    }
    Ok(())
}

async fn reset(lifecycle: &RuntimeLifecycle, yes: bool, json_mode: bool) -> Result<()> {
    if !yes {
        bail!("runtime reset deletes the installed binary; re-run with --yes to confirm");
    }
    lifecycle.reset().await.context("runtime reset failed")?;
    if json_mode {
        println!("{}", serde_json::json!({ "reset": true }));
    } else {
        println!("Runtime reset complete");
    }
    Ok(())
}

async fn status(lifecycle: &RuntimeLifecycle, json_mode: bool) -> Result<()> {
    let installed = lifecycle.installed_version().await;
    let update_available = match lifecycle.is_update_available().await {
        Ok(available) => Some(available),
        Err(_) => None,
    };
    let alive = lifecycle.is_alive().await;

    if json_mode {
        println!(
            "{}",
            serde_json::json!({
                "installed_version": installed,
                "update_available": update_available,
                "running": alive,
            })
        );
    } else {
        match installed {
            Some(version) => println!("Installed version: {version}"),
            None => println!("Installed version: none"),
        }
        match update_available {
            Some(true) => println!("Update available: yes"),
            Some(false) => println!("Update available: no"),
            None => println!("Update available: unknown (manifest unreachable)"),
        }
        println!("Running: {}", if alive { "yes" } else { "no" });
    }
    Ok(())
}
