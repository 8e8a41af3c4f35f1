//! Configuration model for the Dragoman orchestrator.
//!
//! Loaded hierarchically by `infrastructure::config::ConfigLoader`; every
//! threshold here is a tuned constant carried from operational experience,
//! exposed for configuration rather than re-derived.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub detector: DetectorConfig,
    pub policy: PolicyConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Controlled browser runtime: distribution, install location, and launch
/// pinning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Remote version manifest URL.
    pub manifest_url: String,
    /// Directory the runtime archive is extracted into.
    pub install_dir: PathBuf,
    /// Executable name inside the install directory.
    pub executable_name: String,
    /// Dedicated profile directory for the controlled instance.
    pub profile_dir: PathBuf,
    /// Fixed automation control port. Dedicated to this instance so a second
    /// independent instance on the same machine cannot cross-talk.
    pub control_port: u16,
    /// URL of the conversational web application to open on launch.
    pub app_url: String,
    /// Launch headless by default.
    pub headless: bool,
    /// Grace period before a hard kill when closing the runtime (ms).
    pub close_grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            manifest_url: "https://dist.dragoman.dev/runtime/manifest.json".to_string(),
            install_dir: PathBuf::from(".dragoman/runtime"),
            executable_name: "chromium".to_string(),
            profile_dir: PathBuf::from(".dragoman/profile"),
            control_port: 9321,
            app_url: "https://chat.example.com/".to_string(),
            headless: true,
            close_grace_ms: 10_000,
        }
    }
}

impl RuntimeConfig {
    pub fn executable_path(&self) -> PathBuf {
        self.install_dir.join(&self.executable_name)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

/// Turn completion detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Interval between interface observations (ms).
    pub poll_interval_ms: u64,
    /// Consecutive unchanged, non-busy samples required before a turn counts
    /// as complete. A single quiet sample is not enough: rendering lags
    /// generation, and streaming responses pause mid-turn.
    pub stability_threshold: u32,
    /// Deadline for one turn, measured from send (ms).
    pub response_deadline_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            stability_threshold: 3,
            response_deadline_ms: 180_000,
        }
    }
}

impl DetectorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn response_deadline(&self) -> Duration {
        Duration::from_millis(self.response_deadline_ms)
    }
}

/// Session continuity thresholds and bounded-window sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Consecutive errors that force a session reset.
    pub error_streak_reset: u32,
    /// Consecutive successes that force a session reset, bounding unbounded
    /// session growth.
    pub success_streak_reset: u32,
    /// Recent-average latency must exceed running average by this ratio to
    /// trigger a degradation reset.
    pub latency_degradation_ratio: f64,
    /// ...and must also exceed this floor (ms).
    pub latency_degradation_floor_ms: u64,
    /// A single response slower than this resets outright (ms).
    pub latency_single_ceiling_ms: u64,
    /// Latency samples averaged for the "recent" window.
    pub recent_sample_count: usize,
    /// Retained latency samples.
    pub max_latency_samples: usize,
    /// Retained context tails.
    pub max_context_tails: usize,
    /// Characters kept per context tail.
    pub max_tail_chars: usize,
    /// Glossary capacity (FIFO eviction past this).
    pub max_glossary_entries: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            error_streak_reset: 2,
            success_streak_reset: 20,
            latency_degradation_ratio: 1.5,
            latency_degradation_floor_ms: 3_000,
            latency_single_ceiling_ms: 10_000,
            recent_sample_count: 3,
            max_latency_samples: 10,
            max_context_tails: 3,
            max_tail_chars: 200,
            max_glossary_entries: 50,
        }
    }
}

impl PolicyConfig {
    pub fn latency_degradation_floor(&self) -> Duration {
        Duration::from_millis(self.latency_degradation_floor_ms)
    }

    pub fn latency_single_ceiling(&self) -> Duration {
        Duration::from_millis(self.latency_single_ceiling_ms)
    }
}

/// Work-unit sizing for the chunked pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target language for translation prompts.
    pub target_language: String,
    /// Chunk size used while latency stays healthy (chars).
    pub chunk_size_large: usize,
    /// Chunk size once the running average degrades past
    /// `chunk_degraded_latency_ms` (chars).
    pub chunk_size_medium: usize,
    /// Chunk size once the running average degrades past
    /// `chunk_slow_latency_ms` (chars).
    pub chunk_size_small: usize,
    /// Running-average latency above which medium chunks are used (ms).
    pub chunk_degraded_latency_ms: u64,
    /// Running-average latency above which small chunks are used (ms).
    pub chunk_slow_latency_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_language: "English".to_string(),
            chunk_size_large: 5_000,
            chunk_size_medium: 3_500,
            chunk_size_small: 2_000,
            chunk_degraded_latency_ms: 3_000,
            chunk_slow_latency_ms: 5_000,
        }
    }
}

/// Logging output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: trace, debug, info, warn, error.
    pub level: String,
    /// Output format: json or pretty.
    pub format: String,
    /// Optional directory for a plain (non-rotated) log file.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_dir: None,
        }
    }
}
