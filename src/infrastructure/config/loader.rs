use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Manifest URL cannot be empty")]
    EmptyManifestUrl,

    #[error("Install directory cannot be empty")]
    EmptyInstallDir,

    #[error("Invalid control port: {0}. Must be above 1024")]
    InvalidControlPort(u16),

    #[error("Invalid poll interval: {0}ms. Must be positive")]
    InvalidPollInterval(u64),

    #[error("Invalid stability threshold: {0}. Must be at least 1")]
    InvalidStabilityThreshold(u32),

    #[error(
        "Invalid response deadline: {0}ms. Must exceed the poll interval ({1}ms)"
    )]
    InvalidResponseDeadline(u64, u64),

    #[error("Invalid latency degradation ratio: {0}. Must be greater than 1.0")]
    InvalidDegradationRatio(f64),

    #[error("Invalid chunk sizes: small {0}, medium {1}, large {2}. Must be positive and ascending")]
    InvalidChunkSizes(usize, usize, usize),

    #[error("Invalid error streak threshold: {0}. Cannot be 0")]
    InvalidErrorStreak(u32),

    #[error("Invalid success streak threshold: {0}. Cannot be 0")]
    InvalidSuccessStreak(u32),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .dragoman/config.yaml (project config, created by init)
    /// 3. .dragoman/local.yaml (project local overrides, optional)
    /// 4. Environment variables (DRAGOMAN_* prefix, highest priority)
    ///
    /// Configuration is project-local (pwd/.dragoman/) so several instances
    /// on one machine can point at different runtimes and control ports.
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".dragoman/config.yaml"))
            .merge(Yaml::file(".dragoman/local.yaml"))
            .merge(Env::prefixed("DRAGOMAN_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("DRAGOMAN_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.runtime.manifest_url.is_empty() {
            return Err(ConfigError::EmptyManifestUrl);
        }
        if config.runtime.install_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyInstallDir);
        }
        if config.runtime.control_port <= 1024 {
            return Err(ConfigError::InvalidControlPort(config.runtime.control_port));
        }
        if config.runtime.executable_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "runtime executable name cannot be empty".to_string(),
            ));
        }

        if config.detector.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval(
                config.detector.poll_interval_ms,
            ));
        }
        if config.detector.stability_threshold == 0 {
            return Err(ConfigError::InvalidStabilityThreshold(
                config.detector.stability_threshold,
            ));
        }
        if config.detector.response_deadline_ms <= config.detector.poll_interval_ms {
            return Err(ConfigError::InvalidResponseDeadline(
                config.detector.response_deadline_ms,
                config.detector.poll_interval_ms,
            ));
        }

        if config.policy.error_streak_reset == 0 {
            return Err(ConfigError::InvalidErrorStreak(
                config.policy.error_streak_reset,
            ));
        }
        if config.policy.success_streak_reset == 0 {
            return Err(ConfigError::InvalidSuccessStreak(
                config.policy.success_streak_reset,
            ));
        }
        if config.policy.latency_degradation_ratio <= 1.0 {
            return Err(ConfigError::InvalidDegradationRatio(
                config.policy.latency_degradation_ratio,
            ));
        }
        if config.policy.max_latency_samples == 0
            || config.policy.recent_sample_count == 0
            || config.policy.recent_sample_count > config.policy.max_latency_samples
        {
            return Err(ConfigError::ValidationFailed(format!(
                "latency window sizes invalid: recent {} of {}",
                config.policy.recent_sample_count, config.policy.max_latency_samples
            )));
        }
        if config.policy.max_glossary_entries == 0 || config.policy.max_context_tails == 0 {
            return Err(ConfigError::ValidationFailed(
                "glossary and context windows must be non-empty".to_string(),
            ));
        }

        let (small, medium, large) = (
            config.pipeline.chunk_size_small,
            config.pipeline.chunk_size_medium,
            config.pipeline.chunk_size_large,
        );
        if small == 0 || small > medium || medium > large {
            return Err(ConfigError::InvalidChunkSizes(small, medium, large));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
