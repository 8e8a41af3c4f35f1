//! `translate` command: run the chunked translation pipeline over a file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::adapters::{
    EmptyPresetProvider, FilePresetProvider, ScriptedProcessControl, ScriptedSurface,
};
use crate::application::{
    CompletionDetector, ContinuityPolicy, OwnershipArbiter, PipelineEvent, RuntimeLifecycle,
    TranslationPipeline,
};
use crate::cli::output::create_progress_bar;
use crate::domain::models::{Config, PartialResults};
use crate::domain::ports::GlossaryProvider;

#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Input text file (UTF-8)
    pub input: PathBuf,

    /// Output file (defaults to <input>.translated.txt)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Glossary and instruction preset (YAML)
    #[arg(long)]
    pub preset: Option<PathBuf>,

    /// Partial-results file from an interrupted run to resume from
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Rehearse offline against the scripted echo surface
    #[arg(long)]
    pub dry_run: bool,

    /// Run the runtime with a visible window
    #[arg(long)]
    pub headed: bool,
}

pub async fn execute(args: TranslateArgs, config: &Config, json_mode: bool) -> Result<()> {
    if !args.dry_run {
        // The automation surface binding (element selection against the
        // target page) is supplied by the embedding application through
        // `dragoman::domain::ports::AutomationSurface`. The CLI itself only
        // ships the scripted rehearsal surface.
        bail!(
            "no automation surface is configured; run with --dry-run to rehearse \
             against the scripted echo surface, or embed dragoman as a library \
             and provide an AutomationSurface implementation"
        );
    }

    let text = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    if text.trim().is_empty() {
        bail!("input file {} is empty", args.input.display());
    }

    let resume_from = match &args.resume {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read resume file {}", path.display()))?;
            let partial: PartialResults =
                serde_json::from_str(&raw).context("resume file malformed")?;
            partial.completed
        }
        None => Vec::new(),
    };

    let preset = match &args.preset {
        Some(path) => FilePresetProvider::new(path)
            .load()
            .context("failed to load preset")?,
        None => EmptyPresetProvider.load().context("failed to load preset")?,
    };

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    let partial_path = partial_results_path(&output_path);

    // Dry runs rehearse against in-memory adapters; keep their install
    // churn out of the project directory.
    let mut run_config = config.clone();
    run_config.runtime.install_dir =
        std::env::temp_dir().join(format!("dragoman-dry-{}", Uuid::new_v4()));
    run_config.runtime.profile_dir = run_config.runtime.install_dir.join("profile");
    run_config.detector.poll_interval_ms = run_config.detector.poll_interval_ms.min(10);

    let surface = Arc::new(ScriptedSurface::echoing());
    let control = Arc::new(ScriptedProcessControl::new("0.0.0-dry"));
    let lifecycle = Arc::new(RuntimeLifecycle::new(control, run_config.runtime.clone()));
    let arbiter = Arc::new(OwnershipArbiter::new(lifecycle));
    arbiter.spawn_exit_monitor();

    let detector = CompletionDetector::new(run_config.detector.clone());
    let policy = ContinuityPolicy::new(
        run_config.policy.clone(),
        run_config.pipeline.clone(),
        preset,
    );

    let (event_tx, event_rx) = mpsc::channel::<PipelineEvent>(64);
    let mut pipeline = TranslationPipeline::new(surface, arbiter, detector, policy)
        .with_headless(!args.headed)
        .with_events(event_tx);

    let progress = (!json_mode).then(|| {
        let pb = create_progress_bar(text.chars().count() as u64);
        spawn_progress_consumer(event_rx, pb.clone());
        pb
    });

    let outcome = pipeline.translate(&text, resume_from).await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match outcome {
        Ok(results) => {
            let rendered = results.join("\n\n");
            tokio::fs::write(&output_path, rendered)
                .await
                .with_context(|| format!("failed to write {}", output_path.display()))?;
            let _ = tokio::fs::remove_file(&partial_path).await;

            if json_mode {
                println!(
                    "{}",
                    serde_json::json!({
                        "output": output_path,
                        "units": results.len(),
                    })
                );
            } else {
                println!(
                    "Translated {} units into {}",
                    results.len(),
                    output_path.display()
                );
            }
            Ok(())
        }
        Err(failure) => {
            let partial = PartialResults {
                completed: failure.completed.clone(),
            };
            tokio::fs::write(&partial_path, serde_json::to_string_pretty(&partial)?)
                .await
                .with_context(|| format!("failed to write {}", partial_path.display()))?;

            Err(anyhow::Error::new(failure).context(format!(
                "partial results saved to {} (pass --resume to continue)",
                partial_path.display()
            )))
        }
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let mut name = input.file_stem().map_or_else(
        || "output".to_string(),
        |stem| stem.to_string_lossy().to_string(),
    );
    name.push_str(".translated.txt");
    input.with_file_name(name)
}

fn partial_results_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map_or_else(
        || "output".to_string(),
        |file| file.to_string_lossy().to_string(),
    );
    name.push_str(".partial.json");
    output.with_file_name(name)
}

fn spawn_progress_consumer(
    mut events: mpsc::Receiver<PipelineEvent>,
    pb: indicatif::ProgressBar,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PipelineEvent::UnitStarted { index, .. } => {
                    pb.set_message(format!("unit {}", index + 1));
                }
                PipelineEvent::SessionReset { .. } => {
                    pb.set_message("fresh session");
                }
                PipelineEvent::UnitCompleted { source_chars, .. } => {
                    pb.inc(source_chars as u64);
                }
                PipelineEvent::UnitFailed { index, error } => {
                    pb.set_message(format!("unit {} failed: {error}", index + 1));
                }
                PipelineEvent::Finished { .. } => {
                    pb.set_message("done");
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/work/novel.txt")),
            PathBuf::from("/work/novel.translated.txt")
        );
        assert_eq!(
            default_output_path(Path::new("notes")),
            PathBuf::from("notes.translated.txt")
        );
    }

    #[test]
    fn test_partial_results_path() {
        assert_eq!(
            partial_results_path(Path::new("/work/out.txt")),
            PathBuf::from("/work/out.txt.partial.json")
        );
    }
}
